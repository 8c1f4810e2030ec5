//! Handler modules

pub mod events;
pub mod health;
pub mod sessions;
pub mod stream;
pub mod views;

pub use events::*;
pub use health::*;
pub use sessions::*;
pub use stream::*;
pub use views::*;
