//! The `cybertutor init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("cybertutor.toml").exists() {
        println!("cybertutor.toml already exists, skipping.");
    } else {
        std::fs::write("cybertutor.toml", SAMPLE_CONFIG)?;
        println!("Created cybertutor.toml");
    }

    std::fs::create_dir_all("content")?;
    let catalog_path = Path::new("content/catalog.toml");
    if catalog_path.exists() {
        println!("content/catalog.toml already exists, skipping.");
    } else {
        std::fs::write(catalog_path, SAMPLE_CATALOG)?;
        println!("Created content/catalog.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit cybertutor.toml with your API key");
    println!("  2. Run: cybertutor register --name Admin --id admin --superuser");
    println!("  3. Run: cybertutor import --catalog content/catalog.toml --as admin");
    println!("  4. Run: cybertutor register --name <you>");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# cybertutor configuration

data_file = "cybertutor-data.json"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[classifier]
provider = "anthropic"
timeout_secs = 30
max_retries = 1
retry_delay_ms = 500
topics = [
    "Network Security",
    "Cryptography",
    "Web Application Security",
    "Social Engineering",
    "Malware Analysis",
]

[assessment]
sample_size = 10
"#;

const SAMPLE_CATALOG: &str = r#"[[topics]]
id = "network-security"
title = "Network Security"
description = "Protecting data in transit"
order = 1

[[topics.chapters]]
id = "net-intro"
title = "What is a firewall?"
kind = "text"
order = 1

[topics.chapters.content]
beginner = "A firewall filters traffic between networks using rules."
expert = "Stateful firewalls track connection state; compare with stateless ACLs."

[[topics.chapters]]
id = "net-quiz"
title = "Firewall check"
kind = "assessment"
order = 2

[[topics.chapters.questions]]
id = "net-q1"
prompt = "What does a firewall filter?"
correct = "b"
difficulty = "beginner"

[topics.chapters.questions.choices]
a = "Electricity"
b = "Network traffic"
c = "Keystrokes"

[[topics.chapters.questions]]
id = "net-q2"
prompt = "Which firewall type tracks connection state?"
correct = "a"
difficulty = "intermediate"

[topics.chapters.questions.choices]
a = "Stateful"
b = "Stateless"

[[topics.chapters.questions]]
id = "net-q3"
prompt = "Which packet does a stateful firewall use to open a TCP flow entry?"
correct = "c"
difficulty = "expert"

[topics.chapters.questions.choices]
a = "FIN"
b = "RST"
c = "SYN"

[[topics.chapters]]
id = "net-segmentation"
title = "Network segmentation"
kind = "text"
order = 3
required_level = 1

[topics.chapters.content]
beginner = "Splitting a network limits how far an intruder can move."
"#;
