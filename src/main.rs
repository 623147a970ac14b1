//! dialogue-repl: play-test dialogue content from a terminal
//!
//! Commands:
//!   talk <npc>   start a conversation
//!   bye          end the current conversation
//!   quit         exit
//! Anything else is sent to the current conversation as player input.

use dialogue_engine::{
    DialogueConfig, DialogueManager, DialogueResponse, ErrorClass, NpcSnapshot, Participants,
    PlayerSnapshot,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with dialogue on stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dialogue_engine=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = match std::env::var("DIALOGUE_CONFIG") {
        Ok(path) => DialogueConfig::load(path)?,
        Err(_) => DialogueConfig::from_env()?,
    };
    let player_name = std::env::var("DIALOGUE_PLAYER").unwrap_or_else(|_| "Traveller".to_string());

    let manager = Arc::new(DialogueManager::open(config)?);
    manager.initialize(Vec::new()).await?;

    let mut player = PlayerSnapshot::new("local", player_name);
    let mut current: Option<(String, NpcSnapshot)> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("talk <npc> to start, bye to leave, quit to exit");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "quit" {
            break;
        }
        if line == "bye" {
            if let Some((id, _)) = current.take() {
                manager.end_conversation(&id).await;
                println!("(conversation ended)");
            }
            continue;
        }
        if let Some(npc_id) = line.strip_prefix("talk ") {
            let npc = NpcSnapshot::new(npc_id.trim(), npc_id.trim());
            let mut participants = Participants::new(player.clone(), npc.clone());
            match manager.start_conversation(&mut participants, None).await {
                Ok(response) => {
                    player = participants.player;
                    render(&response);
                    if !response.is_complete {
                        current = Some((response.conversation_id, npc));
                    }
                }
                Err(e) => println!("! {e}"),
            }
            continue;
        }

        let Some((id, npc)) = current.clone() else {
            println!("! not talking to anyone");
            continue;
        };
        let mut participants = Participants::new(player.clone(), npc);
        match manager.continue_conversation(&mut participants, &id, line).await {
            Ok(response) => {
                player = participants.player;
                render(&response);
                if response.is_complete {
                    current = None;
                }
            }
            Err(e) => {
                println!("! {e}");
                if matches!(e.class(), ErrorClass::Timeout | ErrorClass::Lookup) {
                    current = None;
                }
            }
        }
    }

    manager.shutdown().await?;
    Ok(())
}

fn render(response: &DialogueResponse) {
    println!("{}", response.message);
    for choice in response.choices.iter().flatten() {
        println!("  {}. {}", choice.index, choice.text);
    }
    if response.is_complete {
        println!("(conversation ended)");
    }
}
