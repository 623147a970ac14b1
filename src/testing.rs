//! Fixtures and mocks shared by the test suites

use crate::clock::ManualClock;
use crate::config::{DialogueConfig, EngineSettings};
use crate::context::{DialogueContext, NpcSnapshot, Participants, PlayerSnapshot};
use crate::conversation::ConversationArena;
use crate::events::{DialogueEvent, EventBus};
use crate::manager::DialogueManager;
use crate::provider::{CannedProvider, DialogueProvider, ProviderContext};
use crate::rules::CustomActionHook;
use crate::tree::{DialogueChoice, DialogueNode, DialogueTree};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

// ============================================================================
// Content
// ============================================================================

/// `greet` offers "Buy a sword" (→ `shop`, an end node) and "Leave" (no target)
pub fn greet_tree() -> DialogueTree {
    let greet = DialogueNode {
        id: "greet".to_string(),
        message: "Hello {{player.name}}".to_string(),
        choices: vec![
            DialogueChoice {
                id: "1".to_string(),
                text: "Buy a sword".to_string(),
                next_node_id: Some("shop".to_string()),
                ..DialogueChoice::default()
            },
            DialogueChoice {
                id: "2".to_string(),
                text: "Leave".to_string(),
                ..DialogueChoice::default()
            },
        ],
        ..DialogueNode::default()
    };
    let shop = DialogueNode {
        id: "shop".to_string(),
        message: "Here are my finest blades.".to_string(),
        is_end: true,
        ..DialogueNode::default()
    };

    DialogueTree {
        id: "merchant_greeting".to_string(),
        name: "Merchant greeting".to_string(),
        start_node_id: "greet".to_string(),
        nodes: [("greet".to_string(), greet), ("shop".to_string(), shop)]
            .into_iter()
            .collect(),
        ..DialogueTree::default()
    }
}

// ============================================================================
// Participants and contexts
// ============================================================================

/// A level 1 player named Ada talking to `npc_id`
pub fn participants(player_id: &str, npc_id: &str) -> Participants {
    Participants::new(
        PlayerSnapshot::new(player_id, "Ada"),
        NpcSnapshot::new(npc_id, "Bram"),
    )
}

pub fn test_context() -> DialogueContext {
    let people = participants("p1", "smith");
    let mut ctx = DialogueContext {
        player: people.player,
        npc: people.npc,
        world: people.world,
        ..DialogueContext::default()
    };
    ctx.conversation.id = "conv-test".to_string();
    ctx.conversation.tree_id = greet_tree().id;
    ctx.conversation.current_node_id = "greet".to_string();
    ctx
}

pub fn provider_context() -> (ProviderContext, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let ctx = ProviderContext {
        arena: Arc::new(ConversationArena::new()),
        events: EventBus::new(64),
        clock: clock.clone(),
        settings: Arc::new(EngineSettings::default()),
    };
    (ctx, clock)
}

// ============================================================================
// Events
// ============================================================================

/// Everything already published to `rx`
pub fn drain(rx: &mut broadcast::Receiver<DialogueEvent>) -> Vec<DialogueEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Mock custom action hook
// ============================================================================

/// Records every custom action it sees, failing on one name if asked
#[derive(Debug, Default)]
pub struct RecordingHook {
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingHook {
    pub fn failing_on(name: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(name.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CustomActionHook for RecordingHook {
    fn run(&self, name: &str, _params: &Value, _ctx: &mut DialogueContext) -> Result<(), String> {
        self.calls.lock().unwrap().push(name.to_string());
        if self.fail_on.as_deref() == Some(name) {
            return Err(format!("{name} refused"));
        }
        Ok(())
    }
}

// ============================================================================
// Managers
// ============================================================================

/// Config whose content directory does not exist, so only trees installed
/// by the test are present
pub fn test_config() -> DialogueConfig {
    DialogueConfig {
        content_dir: PathBuf::from("/nonexistent/dialogues"),
        ..DialogueConfig::default()
    }
}

/// Canned provider with [`greet_tree`] mapped to NPC `smith`
pub fn greet_provider(id: &str) -> Arc<dyn DialogueProvider> {
    let provider = CannedProvider::new().with_id(id);
    let tree = greet_tree();
    provider.set_tree_mapping("smith", tree.id.clone());
    provider.replace_tree(tree).unwrap();
    Arc::new(provider)
}

/// Initialized manager on a manual clock; with no providers given, a single
/// `canned` greet provider is used
pub async fn test_manager(
    config: DialogueConfig,
    providers: Vec<Arc<dyn DialogueProvider>>,
) -> (Arc<DialogueManager>, Arc<ManualClock>) {
    let providers = if providers.is_empty() {
        vec![greet_provider("canned")]
    } else {
        providers
    };
    let clock = Arc::new(ManualClock::default());
    let manager = Arc::new(DialogueManager::new(config).with_clock(clock.clone()));
    manager.initialize(providers).await.unwrap();
    (manager, clock)
}
