pub mod session;
pub mod webhook;

pub use session::Session;
pub use webhook::{TopicCategory, WebhookEnvelope, WebhookTopic};
