//! The `cybertutor quiz` command.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Instant;

use anyhow::Result;

use cybertutor_core::model::ChapterKind;
use cybertutor_core::scoring::score_assessment;

use super::{next, Session, SessionOptions};

pub async fn execute(options: &SessionOptions, user: String, chapter_id: String) -> Result<()> {
    let session = Session::open(options).await?;
    let engine = session.engine()?;

    let chapter = engine.find_chapter(&chapter_id).await?;
    anyhow::ensure!(
        chapter.kind == ChapterKind::Assessment,
        "chapter {} is a {} chapter, not an assessment",
        chapter.id,
        chapter.kind
    );
    // Refuses locked chapters before any questions are shown.
    engine.present_chapter(&user, &chapter).await?;

    let assessment = engine.assemble_assessment(&user, &chapter).await?;
    anyhow::ensure!(
        !assessment.is_empty(),
        "no questions available for chapter {} at your level",
        chapter.id
    );

    println!("{} ({} questions)\n", chapter.title, assessment.len());
    for (i, (_, question)) in assessment.slots.iter().enumerate() {
        println!("{}. {}", i + 1, question.prompt);
        for (key, text) in &question.choices {
            println!("   {key}) {text}");
        }
        println!();
    }

    let started = Instant::now();
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let elapsed = started.elapsed().as_secs();

    let responses: BTreeMap<String, String> = assessment
        .slots
        .iter()
        .map(|(slot, _)| slot.clone())
        .zip(input.lines().map(|l| l.trim().to_lowercase()))
        .filter(|(_, answer)| !answer.is_empty())
        .collect();

    let score = score_assessment(&responses, &assessment.answer_key);
    let outcome = engine
        .record_assessment_outcome(
            &user,
            &chapter,
            score.percentage_correct,
            score.passed,
            elapsed,
        )
        .await?;

    println!(
        "Score: {:.0}% ({})",
        score.percentage_correct,
        if score.passed { "passed" } else { "failed" }
    );
    if let Some(level) = outcome.level {
        println!("Chapter complete. Level in {} is now {level}.", chapter.topic_id);
    }

    next::report(&engine, &user, &chapter).await
}
