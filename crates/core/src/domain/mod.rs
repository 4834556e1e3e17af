pub mod conversation;
pub mod intent;
pub mod knowledge;
pub mod listing;
pub mod message;
pub mod outreach;
pub mod requirements;
pub mod response;
