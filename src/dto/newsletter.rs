use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Newsletter, Subscriber};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubscribeRequest {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnsubscribeRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateGroupsRequest {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SendNewsletterRequest {
    #[validate(length(min = 1, max = 255, message = "subject is required"))]
    pub subject: String,
    #[validate(length(min = 1, message = "content is required"))]
    pub html_content: String,
    /// Empty means every active subscriber.
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryReport {
    pub newsletter_id: Uuid,
    pub recipients: usize,
    pub sent: usize,
    pub failed: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriberList {
    pub items: Vec<Subscriber>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NewsletterList {
    pub items: Vec<Newsletter>,
}
