use crate::db;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Reporting categories. Broader than the routing table so analytics stays
/// stable when reply wording changes.
const CATEGORIES: &[(&str, &[&str])] = &[
    ("courses", &["course", "class", "subject", "enrolled"]),
    ("assignments", &["assignment", "homework", "deadline", "due", "project"]),
    ("study_tips", &["study", "learn", "remember", "focus", "memorize", "notes"]),
    ("exams", &["exam", "test", "quiz", "final", "midterm", "prepare"]),
    ("time_management", &["time", "schedule", "plan", "organize", "productivity"]),
    ("resources", &["resource", "material", "book", "article", "video"]),
    ("career", &["career", "job", "profession", "future", "industry"]),
    ("wellbeing", &["stress", "anxiety", "motivation", "health", "balance"]),
    ("technology", &["tool", "software", "app", "online", "digital"]),
];

pub fn categorize_query(query: &str) -> &'static str {
    let lower = query.to_lowercase();
    CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(c, _)| *c)
        .unwrap_or("general")
}

/// Stores one chat message; interactions count as successful until the
/// learner says otherwise.
pub fn log_interaction(conn: &Connection, user_id: i64, query: &str, category: &str) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO chat_interactions(id, user_id, query, category, success, created_at)
         VALUES(?, ?, ?, ?, 1, ?)",
        (&id, user_id, query, category, db::now_ts()),
    )?;
    Ok(id)
}

/// Returns false when the interaction no longer exists.
pub fn record_feedback(conn: &Connection, interaction_id: &str, helpful: bool) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE chat_interactions SET success = ? WHERE id = ?",
        (i64::from(helpful), interaction_id),
    )?;
    Ok(n > 0)
}

pub fn common_queries(conn: &Connection, limit: i64) -> anyhow::Result<Vec<Value>> {
    let mut stmt = conn.prepare(
        "SELECT query, category, COUNT(*) AS n, COALESCE(SUM(success), 0) AS ok
         FROM chat_interactions
         GROUP BY query, category
         ORDER BY n DESC, query
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit], |r| {
            let query: String = r.get(0)?;
            let category: String = r.get(1)?;
            let count: i64 = r.get(2)?;
            let ok: i64 = r.get(3)?;
            let rate = if count > 0 {
                (ok as f64 * 100.0 / count as f64 * 100.0).round() / 100.0
            } else {
                0.0
            };
            Ok(json!({
                "query": query,
                "category": category,
                "count": count,
                "successRate": rate,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn top_categories(conn: &Connection) -> anyhow::Result<Map<String, Value>> {
    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*) AS n
         FROM chat_interactions
         GROUP BY category
         ORDER BY n DESC, category",
    )?;
    let mut out = Map::new();
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
    for row in rows {
        let (category, n) = row?;
        out.insert(category, json!(n));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_table_order() {
        assert_eq!(categorize_query("When is the homework due?"), "assignments");
        assert_eq!(categorize_query("Tips to study for the midterm"), "study_tips");
        assert_eq!(categorize_query("I feel stressed"), "wellbeing");
        assert_eq!(categorize_query("hello"), "general");
    }

    #[test]
    fn feedback_updates_success_rate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path()).expect("open db");
        let a = log_interaction(&conn, 5, "help", "general").expect("log");
        log_interaction(&conn, 6, "help", "general").expect("log");
        log_interaction(&conn, 6, "my courses", "courses").expect("log");
        assert!(record_feedback(&conn, &a, false).expect("feedback"));
        assert!(!record_feedback(&conn, "missing", true).expect("feedback"));

        let common = common_queries(&conn, 10).expect("common");
        assert_eq!(common[0]["query"], "help");
        assert_eq!(common[0]["count"], 2);
        assert_eq!(common[0]["successRate"], 50.0);

        let cats = top_categories(&conn).expect("categories");
        assert_eq!(cats["general"], 2);
        assert_eq!(cats["courses"], 1);
    }
}
