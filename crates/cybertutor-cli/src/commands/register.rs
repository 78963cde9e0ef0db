//! The `cybertutor register` command.

use anyhow::Result;

use cybertutor_core::engine::NewUser;
use cybertutor_core::model::ContentFormat;

use super::{Session, SessionOptions};

pub async fn execute(
    options: &SessionOptions,
    name: String,
    id: Option<String>,
    preference: ContentFormat,
    superuser: bool,
) -> Result<()> {
    let session = Session::open(options).await?;
    let engine = session.engine()?;

    let user = engine
        .register_user(NewUser {
            id,
            display_name: name,
            content_preference: preference,
            superuser,
        })
        .await?;

    println!(
        "Registered {} ({}) in the {} group",
        user.display_name, user.id, user.group
    );
    if user.superuser {
        println!("Content authoring enabled.");
    }
    if !user.survey_completed {
        println!("Next: cybertutor survey --user {} --responses <file>", user.id);
    }
    Ok(())
}
