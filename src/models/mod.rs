pub mod probe;
pub mod scan;
pub mod user;

pub use probe::*;
pub use scan::*;
pub use user::*;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 仅含提示消息的响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new<T: Into<String>>(message: T) -> Self {
        Self {
            message: message.into(),
        }
    }
}
