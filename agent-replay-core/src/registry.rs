//! Agent registry
//!
//! Reconstructs the agent tree of one session from loosely linked ids and
//! accumulates per-agent token usage.
//!
//! Transcripts reference agents before, after, or without ever recording the
//! spawn that created them, so nodes are created lazily on first reference
//! and re-linked when a spawn record shows up. Nothing here can fail: an
//! unknown parent is replaced by the root agent.

use crate::types::{Agent, TokenUsage, ROOT_AGENT_ID};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Colors handed to subagents
pub const AGENT_PALETTE: [&str; 6] = ["cyan", "magenta", "yellow", "green", "red", "blue"];

/// Color of the root agent
pub const ROOT_COLOR: &str = "white";

/// Deterministic color for an agent id.
///
/// Re-parsing a file from scratch must yield the same colors, so this hashes
/// the id instead of assigning round-robin.
pub fn agent_color(id: &str) -> &'static str {
    if id == ROOT_AGENT_ID {
        return ROOT_COLOR;
    }
    let digest = Sha256::digest(id.as_bytes());
    AGENT_PALETTE[digest[0] as usize % AGENT_PALETTE.len()]
}

/// Display name for an agent without a declared name
pub fn default_agent_name(id: &str) -> String {
    if id == ROOT_AGENT_ID {
        return "Main".to_string();
    }
    id.chars().take(7).collect()
}

/// Tree of agents for one session.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Agent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an agent, creating it with defaults if absent.
    ///
    /// Non-root agents created here hang off the root until a spawn record
    /// links them elsewhere.
    pub fn resolve(&mut self, id: &str) -> &mut Agent {
        if id != ROOT_AGENT_ID {
            self.ensure_root();
        }
        self.agents
            .entry(id.to_string())
            .or_insert_with(|| new_agent(id))
    }

    /// Record that `parent_id` spawned `new_id`.
    ///
    /// Unknown parents, self-parenting and links that would close a cycle
    /// all fall back to the root agent.
    pub fn apply_spawn(&mut self, parent_id: &str, new_id: &str, declared_name: Option<&str>) {
        if new_id.is_empty() || new_id == ROOT_AGENT_ID {
            tracing::debug!(new_id, "Ignoring spawn of root agent");
            return;
        }

        let unknown_parent = parent_id != ROOT_AGENT_ID && !self.agents.contains_key(parent_id);
        let parent = if parent_id == new_id || unknown_parent || self.is_ancestor(new_id, parent_id)
        {
            tracing::debug!(
                parent_id,
                new_id,
                "Spawn parent unresolved, attaching to root"
            );
            ROOT_AGENT_ID.to_string()
        } else {
            parent_id.to_string()
        };

        // parent may be the root, which resolve() creates on demand
        self.resolve(&parent);

        let agent = self.resolve(new_id);
        agent.is_subagent = true;
        agent.parent_id = Some(parent);
        if let Some(name) = declared_name.map(str::trim).filter(|n| !n.is_empty()) {
            agent.name = name.to_string();
        }
    }

    /// Add token usage to an agent (counters only grow)
    pub fn apply_usage(&mut self, id: &str, usage: TokenUsage) {
        if usage.is_zero() {
            return;
        }
        let agent = self.resolve(id);
        agent.input_tokens = agent.input_tokens.saturating_add(usage.input);
        agent.output_tokens = agent.output_tokens.saturating_add(usage.output);
        agent.cache_read_tokens = agent.cache_read_tokens.saturating_add(usage.cache_read);
    }

    /// Note activity for an agent; the first timestamp becomes its spawn time
    pub fn note_activity(&mut self, id: &str, timestamp: &str) {
        let agent = self.resolve(id);
        if agent.spawn_time.is_none() && !timestamp.is_empty() {
            agent.spawn_time = Some(timestamp.to_string());
        }
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Owned copy of the agent map
    pub fn snapshot(&self) -> BTreeMap<String, Agent> {
        self.agents.clone()
    }

    fn ensure_root(&mut self) {
        if !self.agents.contains_key(ROOT_AGENT_ID) {
            self.agents
                .insert(ROOT_AGENT_ID.to_string(), new_agent(ROOT_AGENT_ID));
        }
    }

    /// Whether `candidate` is `id` or one of its ancestors
    fn is_ancestor(&self, candidate: &str, id: &str) -> bool {
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(cur) = current {
            if cur == candidate {
                return true;
            }
            steps += 1;
            if steps > self.agents.len() {
                return false;
            }
            current = self.agents.get(cur).and_then(|a| a.parent_id.as_deref());
        }
        false
    }
}

fn new_agent(id: &str) -> Agent {
    let is_root = id == ROOT_AGENT_ID;
    Agent {
        id: id.to_string(),
        name: default_agent_name(id),
        color: agent_color(id).to_string(),
        is_subagent: !is_root,
        parent_id: if is_root {
            None
        } else {
            Some(ROOT_AGENT_ID.to_string())
        },
        spawn_time: None,
        input_tokens: 0,
        output_tokens: 0,
        cache_read_tokens: 0,
    }
}
