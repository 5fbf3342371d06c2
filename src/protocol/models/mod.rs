pub mod common;
pub mod items;
pub mod response;
pub mod session;
pub mod tools;

pub use common::{DEFAULT_MODEL, DEFAULT_VOICE, ItemStatus, Role, Temperature, TemperatureError};
pub use items::{ContentPart, Item};
pub use response::{Response, ResponseConfig, ResponseStatus};
pub use session::{Session, SessionRequest, SessionUpdate};
pub use tools::{Tool, ToolChoice};
