pub mod completions;
pub mod item;
pub mod revisions;
pub mod serve;
pub mod vars;
pub mod wrap;
