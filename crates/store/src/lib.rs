pub mod error;
pub mod schema;
pub mod store;

pub use error::{Result, StoreError};
pub use schema::{
    Member, Message, MessageType, NewMember, NewMessage, NewTask, Task, TaskStatus, Team,
    TeamUpsert,
};
pub use store::{StoreStats, TeamStore};
