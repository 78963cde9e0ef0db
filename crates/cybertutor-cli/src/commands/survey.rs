//! The `cybertutor survey` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use cybertutor_core::model::SurveyResponse;

use super::{Session, SessionOptions};

#[derive(Deserialize)]
struct SurveyFile {
    #[serde(default)]
    responses: Vec<SurveyResponse>,
}

pub async fn execute(options: &SessionOptions, user: String, responses: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&responses)
        .with_context(|| format!("failed to read survey: {}", responses.display()))?;
    let survey: SurveyFile = toml::from_str(&content)
        .with_context(|| format!("failed to parse survey: {}", responses.display()))?;
    anyhow::ensure!(!survey.responses.is_empty(), "survey has no responses");

    let session = Session::open(options).await?;
    let engine = session.engine()?;
    let outcome = engine.apply_survey(&user, &survey.responses).await?;

    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Topic", "Proficiency"]);
    for (title, topic_id, label) in &outcome.assignments {
        let topic = match topic_id {
            Some(_) => title.clone(),
            None => format!("{title} (not in catalog)"),
        };
        table.add_row(vec![Cell::new(topic), Cell::new(label)]);
    }
    println!("{table}");
    Ok(())
}
