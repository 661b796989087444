pub const CLASSIFICATION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS classifications (
    fingerprint     TEXT PRIMARY KEY,
    verdict_set     TEXT NOT NULL,
    category_scores TEXT NOT NULL,
    final_label     TEXT NOT NULL,
    computed_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_classifications_label ON classifications(final_label);
"#;
