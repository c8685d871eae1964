pub mod context;
pub mod dialects;
pub mod errors;
pub mod generator;
pub mod helpers;
pub mod instance;
pub mod model;
pub mod schema;
pub mod stmts;
pub mod value;
pub mod writer;
