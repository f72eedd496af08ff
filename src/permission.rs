//! Microphone permission gate
//!
//! Resolves the platform's permission state to a definite answer, prompting
//! the user at most once when it is still undetermined.

use crate::settings;
use log::{debug, info, warn};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Platform-reported permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Undetermined,
}

/// Resolved answer handed to callers; never undetermined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Granted,
    Denied,
}

impl Capability {
    pub fn is_granted(&self) -> bool {
        matches!(self, Capability::Granted)
    }
}

/// Source of truth for microphone access on a given platform
pub trait PermissionPlatform: Send + Sync + 'static {
    /// Current state without prompting
    fn state(&self) -> PermissionState;

    /// Prompt the user once; blocks until answered
    fn request(&self) -> bool;
}

/// Answers "may we use the microphone?"
#[derive(Clone)]
pub struct PermissionGate {
    platform: Arc<dyn PermissionPlatform>,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn PermissionPlatform>) -> Self {
        Self { platform }
    }

    /// Resolve the current state, prompting if it is still undetermined
    pub async fn check_or_request(&self) -> Capability {
        match self.platform.state() {
            PermissionState::Granted => Capability::Granted,
            PermissionState::Denied => Capability::Denied,
            PermissionState::Undetermined => {
                debug!("Microphone permission undetermined, prompting");
                let platform = self.platform.clone();
                match tokio::task::spawn_blocking(move || platform.request()).await {
                    Ok(true) => {
                        info!("Microphone permission granted");
                        Capability::Granted
                    }
                    Ok(false) => {
                        info!("Microphone permission denied");
                        Capability::Denied
                    }
                    Err(e) => {
                        warn!("Permission prompt did not complete: {}", e);
                        Capability::Denied
                    }
                }
            }
        }
    }
}

/// Terminal prompt whose answer is remembered in dconf
pub struct ConsolePrompt;

impl PermissionPlatform for ConsolePrompt {
    fn state(&self) -> PermissionState {
        settings::get_microphone_permission()
    }

    fn request(&self) -> bool {
        print!("Allow takebook to use the microphone? [y/N] ");
        let _ = io::stdout().flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        let granted = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
        settings::set_microphone_permission(granted);
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Platform that remembers its answer like the real one does
    struct ScriptedPlatform {
        state: Mutex<PermissionState>,
        answer: bool,
        prompts: AtomicUsize,
    }

    impl ScriptedPlatform {
        fn new(state: PermissionState, answer: bool) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(state),
                answer,
                prompts: AtomicUsize::new(0),
            })
        }
    }

    impl PermissionPlatform for ScriptedPlatform {
        fn state(&self) -> PermissionState {
            *self.state.lock().unwrap()
        }

        fn request(&self) -> bool {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            *self.state.lock().unwrap() = if self.answer {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            };
            self.answer
        }
    }

    #[tokio::test]
    async fn test_settled_states_never_prompt() {
        for (state, expected) in [
            (PermissionState::Granted, Capability::Granted),
            (PermissionState::Denied, Capability::Denied),
        ] {
            let platform = ScriptedPlatform::new(state, true);
            let gate = PermissionGate::new(platform.clone());
            assert_eq!(gate.check_or_request().await, expected);
            assert_eq!(platform.prompts.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_undetermined_prompts_once() {
        let platform = ScriptedPlatform::new(PermissionState::Undetermined, false);
        let gate = PermissionGate::new(platform.clone());

        assert_eq!(gate.check_or_request().await, Capability::Denied);
        assert_eq!(gate.check_or_request().await, Capability::Denied);
        assert_eq!(platform.prompts.load(Ordering::SeqCst), 1);
    }
}
