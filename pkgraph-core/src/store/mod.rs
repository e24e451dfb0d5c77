pub mod neo4j;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use schema::SchemaManager;
pub use traits::GraphStore;
