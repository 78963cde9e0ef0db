//! The `cybertutor progress` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use super::{Session, SessionOptions};

pub async fn execute(options: &SessionOptions, user: String) -> Result<()> {
    let session = Session::open(options).await?;
    let engine = session.engine()?;
    let account = engine.user(&user).await?;
    let rows = engine.progress_overview(&user).await?;

    println!(
        "{} ({} group, survey {})",
        account.display_name,
        account.group,
        if account.survey_completed {
            "done"
        } else {
            "pending"
        }
    );

    let mut table = Table::new();
    table.set_header(vec!["Topic", "Proficiency", "Level", "Chapters"]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(&row.topic.title),
            Cell::new(
                row.proficiency
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(row.level),
            Cell::new(format!("{}/{}", row.completed, row.total)),
        ]);
    }
    println!("{table}");
    Ok(())
}
