//! Rule-based study assistant. Replies come from an ordered keyword table
//! over the lowercased message plus a per-session last topic.

mod analytics;
mod replies;
mod resources;
mod router;
mod session;

use serde::Deserialize;

pub use analytics::{categorize_query, common_queries, log_interaction, record_feedback, top_categories};
pub use replies::welcome;
pub use resources::{resource_card, ResourceCategory};
pub use router::{respond, Route};
pub use session::SessionStore;

/// What the host knows about the learner at message time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerContext {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub courses: Vec<CourseInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseInfo {
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub assignments: Vec<AssignmentInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentInfo {
    pub name: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl AssignmentInfo {
    fn due_label(&self) -> &str {
        self.due_date
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or("No due date set")
    }
}
