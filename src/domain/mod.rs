// Domain data shapes shared across layers

pub mod feedback;
pub mod moderation;
pub mod notification;

pub use feedback::*;
pub use moderation::*;
pub use notification::*;
