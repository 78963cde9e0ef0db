//! The `cybertutor next` command.

use anyhow::Result;

use cybertutor_core::engine::Navigation;
use cybertutor_core::model::Chapter;
use cybertutor_core::ProgressionEngine;

use super::{Session, SessionOptions};

pub async fn execute(options: &SessionOptions, user: String, chapter_id: String) -> Result<()> {
    let session = Session::open(options).await?;
    let engine = session.engine()?;
    let chapter = engine.find_chapter(&chapter_id).await?;
    report(&engine, &user, &chapter).await
}

/// Print where "next chapter" leads from `chapter`.
pub async fn report(engine: &ProgressionEngine, user: &str, chapter: &Chapter) -> Result<()> {
    match engine.navigate_next(user, chapter).await? {
        Navigation::Open(next) => println!("Next chapter: {next}"),
        Navigation::Locked { required, current } => println!(
            "Next chapter locked: requires level {required}, you have {current}"
        ),
        Navigation::EndOfTopic { topic_id } => println!("End of topic {topic_id}"),
    }
    Ok(())
}
