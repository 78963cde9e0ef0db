//! The `cybertutor show` command.

use anyhow::Result;

use super::{Session, SessionOptions};

pub async fn execute(options: &SessionOptions, user: String, chapter_id: String) -> Result<()> {
    let session = Session::open(options).await?;
    let engine = session.engine()?;
    let chapter = engine.find_chapter(&chapter_id).await?;
    let view = engine.present_chapter(&user, &chapter).await?;

    println!("{} [{}]", view.title, view.kind);
    if let Some(audience) = view.audience {
        println!("Level: {audience}");
    }
    if view.format_mismatch {
        println!("Note: this chapter is a video; you asked for text.");
    }
    println!();
    if view.body.is_empty() {
        println!("(no content)");
    } else {
        println!("{}", view.body);
    }
    Ok(())
}
