use super::replies;
use super::resources::{resource_card, ResourceCategory};
use super::session::ChatSession;
use super::{CourseInfo, LearnerContext};
use crate::config::ChatbotConfig;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Courses,
    Assignments,
    StudyTips,
    Exams,
    TimeManagement,
    Resources,
    Subjects,
    Career,
    Wellbeing,
    Technology,
    Greeting,
    Gratitude,
    Identity,
    General,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Courses => "courses",
            Self::Assignments => "assignments",
            Self::StudyTips => "study_tips",
            Self::Exams => "exams",
            Self::TimeManagement => "time_management",
            Self::Resources => "resources",
            Self::Subjects => "subjects",
            Self::Career => "career",
            Self::Wellbeing => "wellbeing",
            Self::Technology => "technology",
            Self::Greeting => "greeting",
            Self::Gratitude => "gratitude",
            Self::Identity => "identity",
            Self::General => "general",
        }
    }
}

/// Checked in order; the first topic with a matching keyword wins.
const TOPIC_TABLE: &[(Topic, &[&str])] = &[
    (
        Topic::Courses,
        &["my courses", "enrolled", "what courses", "which courses", "class", "subject"],
    ),
    (
        Topic::Assignments,
        &["assignment", "homework", "task", "project", "deadline", "due date", "submission"],
    ),
    (
        Topic::StudyTips,
        &[
            "study tips",
            "how to study",
            "study strategy",
            "study better",
            "improve grades",
            "learning technique",
        ],
    ),
    (
        Topic::Exams,
        &["exam", "test", "quiz", "prepare", "revision", "study for"],
    ),
    (
        Topic::TimeManagement,
        &["time management", "schedule", "plan", "organize", "routine", "productivity"],
    ),
    (
        Topic::Resources,
        &["resource", "material", "book", "article", "reading", "video", "learn more"],
    ),
    (
        Topic::Subjects,
        &[
            "math",
            "science",
            "history",
            "english",
            "language",
            "programming",
            "physics",
            "chemistry",
            "biology",
            "economics",
        ],
    ),
    (
        Topic::Career,
        &["career", "job", "future", "graduate", "profession", "industry", "internship"],
    ),
    (
        Topic::Wellbeing,
        &[
            "motivation",
            "stress",
            "anxiety",
            "overwhelmed",
            "tired",
            "mental health",
            "wellbeing",
            "balance",
        ],
    ),
    (
        Topic::Technology,
        &["tool", "software", "app", "technology", "digital", "online", "platform"],
    ),
    (
        Topic::Greeting,
        &["hello", "hi", "hey", "greetings", "good morning", "good afternoon", "good evening"],
    ),
    (Topic::Gratitude, &["thank", "thanks", "appreciate", "helpful"]),
    (
        Topic::Identity,
        &["who are you", "what are you", "your name", "about you"],
    ),
];

/// Messages asking for campus resources get the resource card before any
/// topic routing.
const RESOURCE_CARD_WORDS: &[&str] = &["resources", "support", "help center", "library", "study materials"];

/// Any of these means the learner changed subject rather than followed up.
const NEW_SUBJECT_WORDS: &[&str] = &["course", "assignment", "study", "exam", "resource"];

fn follow_up_words(topic: Topic) -> &'static [&'static str] {
    match topic {
        Topic::Courses => &["which one", "tell me more", "details", "about that", "specific"],
        Topic::Assignments => &["how to", "help with", "more info", "details", "specific"],
        Topic::StudyTips => &["more", "elaborate", "specific", "details", "example"],
        _ => &[],
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Empty,
    ResourceCard,
    FollowUp(Topic),
    Topic(Topic),
}

impl Route {
    pub fn topic(self) -> Option<Topic> {
        match self {
            Route::FollowUp(t) | Route::Topic(t) => Some(t),
            Route::Empty | Route::ResourceCard => None,
        }
    }
}

/// Pure routing decision from the message and the session's last topic.
pub fn classify(message: &str, last_topic: Option<Topic>) -> Route {
    let lower = message.trim().to_lowercase();
    if lower.is_empty() {
        return Route::Empty;
    }
    if contains_any(&lower, RESOURCE_CARD_WORDS) {
        return Route::ResourceCard;
    }
    if let Some(last) = last_topic {
        if !contains_any(&lower, NEW_SUBJECT_WORDS) && contains_any(&lower, follow_up_words(last)) {
            return Route::FollowUp(last);
        }
    }
    let topic = TOPIC_TABLE
        .iter()
        .find(|(_, keywords)| contains_any(&lower, keywords))
        .map(|(t, _)| *t)
        .unwrap_or(Topic::General);
    Route::Topic(topic)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub route: Route,
    pub messages: Vec<String>,
}

fn course_name_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)about\s+([A-Za-z0-9\s]+)(\s+course)?",
            r"(?i)more\s+on\s+([A-Za-z0-9\s]+)(\s+course)?",
            r"(?i)details\s+for\s+([A-Za-z0-9\s]+)(\s+course)?",
            r"(?i)([A-Za-z0-9\s]+)\s+course",
            r"(?i)course\s+([A-Za-z0-9\s]+)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Course name mentioned in a follow-up such as "tell me more about biology".
pub fn extract_course_name(message: &str) -> Option<String> {
    course_name_patterns().iter().find_map(|re| {
        let name = re.captures(message)?.get(1)?.as_str().trim().to_string();
        (!name.is_empty()).then_some(name)
    })
}

fn find_course<'a>(learner: &'a LearnerContext, name: &str) -> Option<&'a CourseInfo> {
    let needle = name.to_lowercase();
    learner.courses.iter().find(|c| {
        c.id.to_string() == needle
            || c.full_name.to_lowercase().contains(&needle)
            || (!c.short_name.is_empty() && c.short_name.to_lowercase().contains(&needle))
    })
}

fn course_follow_up(message: &str, learner: &LearnerContext) -> String {
    extract_course_name(message)
        .and_then(|name| find_course(learner, &name))
        .map(replies::course_details)
        .unwrap_or_else(|| replies::COURSE_PROMPT.to_string())
}

fn owned(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|t| t.to_string()).collect()
}

/// Answers one message and advances the session.
pub fn respond(
    session: &mut ChatSession,
    message: &str,
    learner: &LearnerContext,
    cfg: &ChatbotConfig,
) -> Reply {
    let route = classify(message, session.last_topic);
    let message = message.trim();
    let lower = message.to_lowercase();

    let messages = match route {
        Route::Empty => vec![replies::EMPTY_PROMPT.to_string()],
        Route::ResourceCard => vec![resource_card(ResourceCategory::Study, cfg)],
        Route::FollowUp(topic) => {
            session.remember(message);
            match topic {
                Topic::Courses => vec![course_follow_up(message, learner)],
                Topic::Assignments => vec![replies::assignment_help(&lower).to_string()],
                _ => vec![replies::detailed_study_tips(&lower).to_string()],
            }
        }
        Route::Topic(topic) => {
            session.remember(message);
            session.last_topic = Some(topic);
            topic_reply(topic, &lower, learner, cfg)
        }
    };
    Reply { route, messages }
}

fn topic_reply(topic: Topic, lower: &str, learner: &LearnerContext, cfg: &ChatbotConfig) -> Vec<String> {
    match topic {
        Topic::Courses => replies::course_list(learner),
        Topic::Assignments => replies::assignment_list(learner),
        Topic::StudyTips => vec![replies::STUDY_TIPS.to_string()],
        Topic::Exams => owned(&replies::EXAM_PREP),
        Topic::TimeManagement => owned(&replies::TIME_MANAGEMENT),
        Topic::Resources => vec![replies::LEARNING_RESOURCES.to_string()],
        Topic::Subjects => vec![replies::subject_help(lower)],
        Topic::Career => owned(&replies::CAREER),
        Topic::Wellbeing => owned(&replies::WELLBEING),
        Topic::Technology => vec![replies::TECHNOLOGY.to_string()],
        Topic::Greeting => vec![replies::greeting(&learner.first_name)],
        Topic::Gratitude => vec![replies::GRATITUDE.to_string()],
        Topic::Identity => vec![replies::identity(&cfg.bot_name)],
        Topic::General => owned(&replies::NOT_UNDERSTOOD),
    }
}
