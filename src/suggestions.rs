use crate::db;
use crate::features::{Activity, GradeItem};
use crate::risk::RiskTier;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const MAX_STORED: usize = 5;
const WEAK_AREA_PCT: f64 = 70.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub cm_id: Option<i64>,
    pub cm_name: Option<String>,
    pub resource_type: String,
    pub priority: i64,
    pub reason: String,
}

/// Base priority and reason for an activity type at a risk tier.
fn activity_rule(tier: RiskTier, modname: &str) -> Option<(i64, &'static str)> {
    match (tier, modname) {
        (RiskTier::Low, "forum") => Some((3, "Engaging in this forum discussion will help deepen your understanding of the course material.")),
        (RiskTier::Low, "resource") => Some((2, "Reviewing this resource will reinforce your knowledge of key concepts.")),
        (RiskTier::Medium, "quiz") => Some((7, "Taking this quiz will help identify areas where you need to focus more attention.")),
        (RiskTier::Medium, "forum") => Some((5, "Participating in this forum discussion will help clarify concepts you may be struggling with.")),
        (RiskTier::Medium, "assign") => Some((6, "Completing this assignment will strengthen your skills and understanding.")),
        (RiskTier::Medium, "resource") => Some((4, "Studying this resource is important for improving your understanding of the course material.")),
        (RiskTier::High, "quiz") => Some((9, "This quiz is critical for your success. Taking it will help identify key areas for improvement.")),
        (RiskTier::High, "forum") => Some((7, "Actively participating in this forum is essential for your success in this course.")),
        (RiskTier::High, "assign") => Some((10, "Completing this assignment is urgent and will significantly impact your course performance.")),
        (RiskTier::High, "resource") => Some((8, "This resource contains critical information you need to review immediately.")),
        (RiskTier::High, "workshop") => Some((6, "This peer assessment activity will provide valuable feedback to improve your understanding.")),
        _ => None,
    }
}

/// Grade categories averaging under 70%, with course-level fallbacks.
pub fn weak_areas(grades: &[GradeItem], course_grade_pct: Option<f64>) -> Vec<String> {
    // Keep first-seen order so the two reported areas are stable.
    let mut order: Vec<String> = Vec::new();
    let mut totals: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for item in grades {
        let Some(pct) = item.percent() else {
            continue;
        };
        let category = item
            .item_module
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(item.item_name.as_deref())
            .unwrap_or("")
            .to_string();
        let entry = totals.entry(category.clone()).or_insert_with(|| {
            order.push(category);
            (0.0, 0)
        });
        entry.0 += pct;
        entry.1 += 1;
    }

    let mut weak: Vec<String> = order
        .into_iter()
        .filter(|c| {
            totals
                .get(c)
                .map(|(sum, n)| *n > 0 && sum / f64::from(*n) < WEAK_AREA_PCT)
                .unwrap_or(false)
        })
        .collect();

    if weak.is_empty() {
        weak.push(
            match course_grade_pct {
                Some(p) if p < WEAK_AREA_PCT => "Course Content",
                Some(_) => "Study Skills",
                None => "Course Engagement",
            }
            .to_string(),
        );
    }
    weak
}

fn general_suggestions(tier: RiskTier, weak: &[String]) -> Vec<Suggestion> {
    let risk = tier.value();
    let general = |priority: i64, reason: String| Suggestion {
        cm_id: None,
        cm_name: None,
        resource_type: "general".into(),
        priority,
        reason,
    };

    let mut out = vec![general(
        3 + risk,
        "Consider creating a study schedule to better manage your coursework.".into(),
    )];
    if tier >= RiskTier::Medium {
        out.push(general(
            4 + risk,
            "Try to engage more regularly with the course materials and activities.".into(),
        ));
    }
    if tier == RiskTier::High {
        out.push(general(
            8,
            "Consider forming or joining a study group with classmates to discuss course topics.".into(),
        ));
        out.push(general(
            9,
            "It would be beneficial to schedule a meeting with your instructor to discuss your progress."
                .into(),
        ));
    }
    for area in weak.iter().take(2) {
        out.push(general(
            7 + risk,
            format!(
                "Focus more attention on {} as your performance in this area needs improvement.",
                area
            ),
        ));
    }
    out
}

/// Ranked suggestions for a learner, highest priority first, at most
/// `MAX_STORED` entries.
pub fn generate(
    tier: RiskTier,
    activities: &[Activity],
    grades: &[GradeItem],
    course_grade_pct: Option<f64>,
) -> Vec<Suggestion> {
    let weak = weak_areas(grades, course_grade_pct);
    let mut all = Vec::new();

    for cm in activities {
        if !cm.visible || cm.completed || cm.modname == "label" {
            continue;
        }
        let Some((mut priority, base)) = activity_rule(tier, &cm.modname) else {
            continue;
        };
        let mut reason = base.to_string();
        let name = cm.name.to_lowercase();
        if let Some(area) = weak
            .iter()
            .find(|a| !a.is_empty() && name.contains(&a.to_lowercase()))
        {
            reason.push_str(&format!(
                " This is particularly important for improving your understanding of {}.",
                area
            ));
            priority += 2;
        }
        all.push(Suggestion {
            cm_id: Some(cm.cm_id),
            cm_name: Some(cm.name.clone()),
            resource_type: cm.modname.clone(),
            priority,
            reason,
        });
    }

    all.extend(general_suggestions(tier, &weak));
    all.sort_by(|a, b| b.priority.cmp(&a.priority));
    all.truncate(MAX_STORED);
    all
}

pub fn insert_for_prediction(
    conn: &Connection,
    prediction_id: &str,
    course_id: i64,
    user_id: i64,
    items: &[Suggestion],
) -> rusqlite::Result<()> {
    let now = db::now_ts();
    for s in items {
        conn.execute(
            "INSERT INTO suggestions(id, prediction_id, course_id, user_id, cm_id, cm_name,
               resource_type, priority, reason, created_at, viewed, completed)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0)",
            (
                Uuid::new_v4().to_string(),
                prediction_id,
                course_id,
                user_id,
                s.cm_id,
                &s.cm_name,
                &s.resource_type,
                s.priority,
                &s.reason,
                &now,
            ),
        )?;
    }
    Ok(())
}

pub fn list_for_prediction(conn: &Connection, prediction_id: &str) -> anyhow::Result<Vec<Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, reason, resource_type, cm_id, cm_name, priority, viewed, completed
         FROM suggestions
         WHERE prediction_id = ?
         ORDER BY priority DESC, rowid",
    )?;
    let rows = stmt
        .query_map([prediction_id], |row| {
            let id: String = row.get(0)?;
            let reason: String = row.get(1)?;
            let resource_type: String = row.get(2)?;
            let cm_id: Option<i64> = row.get(3)?;
            let cm_name: Option<String> = row.get(4)?;
            let priority: i64 = row.get(5)?;
            let viewed: i64 = row.get(6)?;
            let completed: i64 = row.get(7)?;
            Ok(json!({
                "id": id,
                "reason": reason,
                "resourceType": resource_type,
                "cmId": cm_id,
                "cmName": cm_name,
                "priority": priority,
                "viewed": viewed != 0,
                "completed": completed != 0,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, PartialEq, Eq)]
pub enum MarkOutcome {
    Updated,
    NotFound,
    NotOwner,
}

/// Marks a learner's own suggestion; completing also marks it viewed.
pub fn mark(
    conn: &Connection,
    suggestion_id: &str,
    user_id: i64,
    completed: bool,
) -> anyhow::Result<MarkOutcome> {
    let owner: Option<i64> = conn
        .query_row(
            "SELECT user_id FROM suggestions WHERE id = ?",
            [suggestion_id],
            |r| r.get(0),
        )
        .optional()?;
    match owner {
        None => return Ok(MarkOutcome::NotFound),
        Some(o) if o != user_id => return Ok(MarkOutcome::NotOwner),
        Some(_) => {}
    }
    if completed {
        conn.execute(
            "UPDATE suggestions SET viewed = 1, completed = 1 WHERE id = ?",
            [suggestion_id],
        )?;
    } else {
        conn.execute("UPDATE suggestions SET viewed = 1 WHERE id = ?", [suggestion_id])?;
    }
    Ok(MarkOutcome::Updated)
}
