//! Host-facing command surface. Every command resolves to a JSON reply or a
//! plain error string, the way the hosting UI expects them.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::capture::ScreenMirror;
use crate::reticle::{Point, Size};
use crate::service::{ActivationParams, OverlayKind, ScanService};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum HostCommand {
    Start(ActivationParams),
    Stop,
    #[serde(rename_all = "camelCase")]
    SetAnalysis {
        enabled: bool,
    },
    ToggleAnalysis,
    StartCountdown,
    CancelCountdown,
    ToggleCountdown,
    StopCountdownAlert,
    Press {
        overlay: OverlayKind,
        x: i32,
        y: i32,
    },
    Drag {
        overlay: OverlayKind,
        x: i32,
        y: i32,
    },
    Release {
        overlay: OverlayKind,
    },
    /// The overlay was laid out at a different size than configured.
    Resize {
        overlay: OverlayKind,
        width: i32,
        height: i32,
    },
    GetSettings,
    #[serde(rename_all = "camelCase")]
    SaveSettings {
        monitor_audio_path: Option<String>,
        countdown_audio_path: Option<String>,
        countdown_duration: Option<String>,
        target_rgb: Option<String>,
    },
    Status,
}

pub type MirrorFactory = dyn Fn() -> Box<dyn ScreenMirror> + Send + Sync;

pub async fn dispatch(
    service: &ScanService,
    command: HostCommand,
    new_mirror: &MirrorFactory,
) -> Result<Value, String> {
    match command {
        HostCommand::Start(params) => {
            let session_id = service
                .start(params, new_mirror())
                .await
                .map_err(|e| format!("{e:#}"))?;
            Ok(json!({ "sessionId": session_id }))
        }
        HostCommand::Stop => {
            service.stop().await.map_err(|e| format!("{e:#}"))?;
            Ok(Value::Null)
        }
        HostCommand::SetAnalysis { enabled } => {
            let enabled = service
                .set_analysis(enabled)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({ "enabled": enabled }))
        }
        HostCommand::ToggleAnalysis => {
            let enabled = service.toggle_analysis().await.map_err(|e| e.to_string())?;
            Ok(json!({ "enabled": enabled }))
        }
        HostCommand::StartCountdown => {
            let started = service.start_countdown().await.map_err(|e| e.to_string())?;
            Ok(json!({ "started": started }))
        }
        HostCommand::CancelCountdown => {
            let cancelled = service.cancel_countdown().await.map_err(|e| e.to_string())?;
            Ok(json!({ "cancelled": cancelled }))
        }
        HostCommand::ToggleCountdown => {
            let running = service.toggle_countdown().await.map_err(|e| e.to_string())?;
            Ok(json!({ "running": running }))
        }
        HostCommand::StopCountdownAlert => {
            Ok(json!({ "stopped": service.stop_countdown_alert() }))
        }
        HostCommand::Press { overlay, x, y } => {
            service
                .press_overlay(overlay, Point::new(x, y))
                .await
                .map_err(|e| e.to_string())?;
            Ok(Value::Null)
        }
        HostCommand::Drag { overlay, x, y } => {
            let moved = service
                .drag_overlay(overlay, Point::new(x, y))
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({ "position": moved }))
        }
        HostCommand::Release { overlay } => {
            let position = service
                .release_overlay(overlay)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({ "position": position }))
        }
        HostCommand::Resize {
            overlay,
            width,
            height,
        } => {
            let position = service
                .resize_overlay(overlay, Size::new(width, height))
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({ "position": position }))
        }
        HostCommand::GetSettings => {
            serde_json::to_value(service.settings().snapshot()).map_err(|e| e.to_string())
        }
        HostCommand::SaveSettings {
            monitor_audio_path,
            countdown_audio_path,
            countdown_duration,
            target_rgb,
        } => {
            let settings = service.settings();
            if let Some(path) = monitor_audio_path {
                settings
                    .save_monitor_audio_path(path)
                    .map_err(|e| e.to_string())?;
            }
            if let Some(path) = countdown_audio_path {
                settings
                    .save_countdown_audio_path(path)
                    .map_err(|e| e.to_string())?;
            }
            if let Some(duration) = countdown_duration {
                settings
                    .save_countdown_duration(duration)
                    .map_err(|e| e.to_string())?;
            }
            if let Some(rgb) = target_rgb {
                settings.save_target_rgb(rgb).map_err(|e| e.to_string())?;
            }
            serde_json::to_value(settings.snapshot()).map_err(|e| e.to_string())
        }
        HostCommand::Status => {
            serde_json::to_value(service.snapshot().await).map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::test_support::{audio_fixture, AudioFixture, ScriptedMirror};
    use tempfile::TempDir;

    fn parse(line: &str) -> HostCommand {
        serde_json::from_str(line).unwrap()
    }

    fn scripted() -> Box<dyn ScreenMirror> {
        Box::new(ScriptedMirror::new().0)
    }

    fn service_with(monitor_path: &str) -> (ScanService, TempDir) {
        let AudioFixture {
            player,
            settings,
            bridge,
            dir,
            ..
        } = audio_fixture(monitor_path, "");
        let service = ScanService::new(ScanConfig::default(), settings, player, bridge);
        (service, dir)
    }

    async fn start_small(service: &ScanService) -> Value {
        dispatch(
            service,
            parse(
                r#"{"command":"start","grant":{"result_code":-1,"data":[]},
                    "display":{"width":100,"height":200,"density_dpi":160}}"#,
            ),
            &scripted,
        )
        .await
        .unwrap()
    }

    #[test]
    fn commands_parse_from_json_lines() {
        assert!(matches!(
            parse(r#"{"command":"toggle-countdown"}"#),
            HostCommand::ToggleCountdown
        ));
        assert!(matches!(
            parse(r#"{"command":"drag","overlay":"reticle","x":10,"y":-4}"#),
            HostCommand::Drag {
                overlay: OverlayKind::Reticle,
                x: 10,
                y: -4
            }
        ));
        assert!(matches!(
            parse(r#"{"command":"resize","overlay":"panel","width":56,"height":200}"#),
            HostCommand::Resize {
                overlay: OverlayKind::Panel,
                width: 56,
                height: 200
            }
        ));

        let start = parse(
            r#"{"command":"start","grant":{"result_code":-1,"data":[1]},
                "display":{"width":1080,"height":2400,"density_dpi":420}}"#,
        );
        let HostCommand::Start(params) = start else {
            panic!("expected start");
        };
        assert_eq!(params.display.width, 1080);
        assert!(params.rgb_override.is_none());

        assert!(serde_json::from_str::<HostCommand>(r#"{"command":"launch"}"#).is_err());
    }

    #[tokio::test]
    async fn session_commands_require_an_active_session() {
        let (service, _dir) = service_with("");

        let err = dispatch(&service, HostCommand::ToggleAnalysis, &scripted)
            .await
            .unwrap_err();
        assert!(err.contains("no capture session"));

        let status = dispatch(&service, HostCommand::Status, &scripted).await.unwrap();
        assert_eq!(status["status"], "idle");
    }

    #[tokio::test]
    async fn save_settings_updates_only_given_keys() {
        let (service, _dir) = service_with("/tmp/a.mp3");

        let reply = dispatch(
            &service,
            parse(
                r#"{"command":"save-settings","countdownDuration":"30","targetRgb":"1,2,3"}"#,
            ),
            &scripted,
        )
        .await
        .unwrap();

        assert_eq!(reply["countdown_duration"], "30");
        assert_eq!(reply["target_rgb"], "1,2,3");
        assert_eq!(reply["monitor_audio_path"], "/tmp/a.mp3");
    }

    #[tokio::test]
    async fn start_then_stop_through_dispatch() {
        let (service, _dir) = service_with("");

        let reply = start_small(&service).await;
        assert!(reply["sessionId"].is_string());

        let status = dispatch(&service, HostCommand::Status, &scripted).await.unwrap();
        assert_eq!(status["status"], "active");
        assert_eq!(status["reticleCenter"]["x"], 50);

        dispatch(&service, HostCommand::Stop, &scripted).await.unwrap();
        assert!(!service.is_active().await);
    }

    #[tokio::test]
    async fn extreme_drag_and_resize_replies_stay_well_formed() {
        let (service, _dir) = service_with("");
        start_small(&service).await;

        dispatch(
            &service,
            parse(r#"{"command":"press","overlay":"reticle","x":0,"y":0}"#),
            &scripted,
        )
        .await
        .unwrap();
        let reply = dispatch(
            &service,
            parse(r#"{"command":"drag","overlay":"reticle","x":2147483647,"y":-2147483648}"#),
            &scripted,
        )
        .await
        .unwrap();
        assert_eq!(reply["position"]["x"], i32::MAX);

        let reply = dispatch(
            &service,
            parse(r#"{"command":"resize","overlay":"panel","width":40,"height":120}"#),
            &scripted,
        )
        .await
        .unwrap();
        assert!(reply["position"]["x"].is_i64());

        let err = dispatch(
            &service,
            parse(r#"{"command":"resize","overlay":"reticle","width":-1,"height":10}"#),
            &scripted,
        )
        .await
        .unwrap_err();
        assert!(err.contains("must be positive"));
    }
}
