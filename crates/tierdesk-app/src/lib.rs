// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod editor;
pub mod filters;
pub mod ids;
pub mod model;
pub mod paging;
pub mod query;
pub mod state;

pub use editor::*;
pub use filters::*;
pub use ids::*;
pub use model::*;
pub use paging::*;
pub use query::*;
pub use state::*;
