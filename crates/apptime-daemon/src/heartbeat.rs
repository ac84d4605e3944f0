//! The Heartbeat Scheduler: while enabled, walks the Registry once a
//! minute and dispatches one heartbeat per program currently holding live
//! PIDs with a non-empty category, to whichever outbound destinations are
//! enabled in configuration.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use tracing::{debug, error, warn};

use apptime_core::{Config, Heartbeat, Registry};

use crate::cancel::{CancelToken, TaskHandle};

const TICK_INTERVAL: Duration = Duration::from_secs(60);
const CONSECUTIVE_FAILURE_LIMIT: u32 = 5;

/// A running scheduler instance, stoppable the same way an Observer is.
pub struct SchedulerHandle(TaskHandle);

impl SchedulerHandle {
    pub fn stop(self) {
        self.0.stop();
    }
}

pub fn start(config: Config, registry: Arc<Registry>) -> SchedulerHandle {
    let token = CancelToken::new();
    let loop_token = token.clone();

    let join = thread::spawn(move || run(config, registry, loop_token));

    SchedulerHandle(TaskHandle::new(token, join))
}

fn run(config: Config, registry: Arc<Registry>, token: CancelToken) {
    let client = ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(10))
        .build();
    let mut consecutive_failures = 0u32;

    loop {
        if token.wait_timeout(TICK_INTERVAL) {
            break;
        }

        let snapshot = registry.snapshot_open();
        let now = chrono::Utc::now().timestamp();

        let mut tick_had_failure = false;
        for (name, category, project) in snapshot {
            let Some(category) = category.filter(|c| !c.is_empty()) else {
                continue;
            };

            let heartbeat = Heartbeat::new(
                name.clone(),
                category,
                project
                    .filter(|p| !p.is_empty())
                    .or_else(|| global_project(&config))
                    .unwrap_or_default(),
                now,
            );

            if config.wakatime.enabled {
                if let Err(err) = send_wakatime(&client, &config, &heartbeat) {
                    error!(program = %name, error = %err, "wakatime heartbeat failed");
                    tick_had_failure = true;
                } else {
                    debug!(program = %name, "wakatime heartbeat sent");
                }
            }

            if config.wakapi.enabled {
                if let Err(err) = send_wakapi(&client, &config, &heartbeat) {
                    error!(program = %name, error = %err, "wakapi heartbeat failed");
                    tick_had_failure = true;
                } else {
                    debug!(program = %name, "wakapi heartbeat sent");
                }
            }
        }

        if tick_had_failure {
            consecutive_failures += 1;
            if consecutive_failures >= CONSECUTIVE_FAILURE_LIMIT {
                warn!(
                    consecutive_failures,
                    "heartbeat scheduler hit consecutive failure limit, stopping early; next refresh restarts it"
                );
                break;
            }
        } else {
            consecutive_failures = 0;
        }
    }
}

fn global_project(config: &Config) -> Option<String> {
    config
        .wakatime
        .global_project
        .clone()
        .or_else(|| config.wakapi.global_project.clone())
}

fn send_wakatime(client: &ureq::Agent, config: &Config, heartbeat: &Heartbeat) -> Result<(), String> {
    let api_key = config
        .wakatime
        .api_key
        .as_deref()
        .ok_or_else(|| "wakatime enabled with no api_key configured".to_string())?;

    let body = serde_json::json!({
        "entity": heartbeat.entity,
        "type": heartbeat.kind,
        "category": heartbeat.category,
        "project": heartbeat.project,
        "time": heartbeat.timestamp,
    });

    client
        .post("https://api.wakatime.com/api/v1/users/current/heartbeats")
        .set("Authorization", &format!("Basic {}", basic_auth_token(api_key)))
        .send_json(body)
        .map_err(|err| err.to_string())?;
    Ok(())
}

/// Wakatime-compatible APIs expect the key itself base64-encoded, not a
/// `user:pass` pair, as the Basic auth token.
fn basic_auth_token(api_key: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(api_key)
}

fn send_wakapi(client: &ureq::Agent, config: &Config, heartbeat: &Heartbeat) -> Result<(), String> {
    let server = config
        .wakapi
        .server
        .as_deref()
        .ok_or_else(|| "wakapi enabled with no server configured".to_string())?;
    let api_key = config
        .wakapi
        .api_key
        .as_deref()
        .ok_or_else(|| "wakapi enabled with no api_key configured".to_string())?;

    let body = serde_json::json!({
        "entity": heartbeat.entity,
        "type": heartbeat.kind,
        "category": heartbeat.category,
        "project": heartbeat.project,
        "time": heartbeat.timestamp,
    });

    let url = format!("{}/api/heartbeat", server.trim_end_matches('/'));
    client
        .post(&url)
        .set("Authorization", &format!("Basic {}", basic_auth_token(api_key)))
        .send_json(body)
        .map_err(|err| err.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_project_prefers_wakatime_then_wakapi() {
        let mut config = Config::default();
        config.wakapi.global_project = Some("fallback".to_string());
        assert_eq!(global_project(&config), Some("fallback".to_string()));

        config.wakatime.global_project = Some("primary".to_string());
        assert_eq!(global_project(&config), Some("primary".to_string()));
    }

    #[test]
    fn basic_auth_token_is_plain_base64_of_the_key() {
        assert_eq!(basic_auth_token("abc123"), "YWJjMTIz");
    }
}
