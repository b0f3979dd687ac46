mod capture;
mod classifier;
mod config;
mod history;
mod hotkeys;
mod overlay;
mod protocol;
mod results;
mod sensor;
mod session;
mod uploader;
mod verdict;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use capture::LastFrame;
use classifier::{ClassifierClient, EducationPayload};
use config::AppConfig;
use history::HistoryEntry;
use session::{SessionHandle, SessionManager};
use tauri::{AppHandle, Manager, State};
use tauri_plugin_opener::OpenerExt;

pub(crate) struct AppState {
    cfg: AppConfig,
    session: SessionHandle,
    classifier: ClassifierClient,
    detection_enabled: AtomicBool,
}

#[tauri::command]
async fn set_detection_enabled(
    enabled: bool,
    state: State<'_, AppState>,
) -> Result<bool, String> {
    state.detection_enabled.store(enabled, Ordering::SeqCst);
    state.session.set_enabled(enabled).await;
    Ok(enabled)
}

#[tauri::command]
fn detection_enabled(state: State<'_, AppState>) -> bool {
    state.detection_enabled.load(Ordering::SeqCst)
}

#[tauri::command]
fn set_overlay_interactive(interactive: bool, app: AppHandle) -> Result<(), String> {
    overlay::set_interactive(&app, interactive).map_err(|err| err.to_string())
}

#[tauri::command]
async fn fetch_education(
    base_id: String,
    state: State<'_, AppState>,
) -> Result<EducationPayload, String> {
    state
        .classifier
        .educate(&base_id)
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
async fn list_history(state: State<'_, AppState>) -> Result<Vec<HistoryEntry>, String> {
    Ok(history::build_history(&state.cfg.frames_dir, &state.classifier).await)
}

#[tauri::command]
async fn classifier_health(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(state.classifier.health().await)
}

#[tauri::command]
fn frames_dir(state: State<'_, AppState>) -> String {
    state.cfg.frames_dir.display().to_string()
}

#[tauri::command]
fn reveal_frames_dir(app: AppHandle, state: State<'_, AppState>) -> Result<(), String> {
    app.opener()
        .reveal_item_in_dir(&state.cfg.frames_dir)
        .map_err(|err| err.to_string())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("FeedLens starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let cfg = AppConfig::from_env();
                std::fs::create_dir_all(&cfg.frames_dir)?;
                std::fs::create_dir_all(&cfg.debug_dir)?;
                log::info!(
                    "classifier at {}, frames in {}",
                    cfg.api_base_url,
                    cfg.frames_dir.display()
                );

                let classifier =
                    ClassifierClient::new(reqwest::Client::new(), cfg.api_base_url.clone());
                let last_frame: LastFrame = Arc::new(Mutex::new(None));

                let session =
                    SessionManager::spawn(app.handle().clone(), cfg.clone(), last_frame.clone());

                overlay::init_overlay_window(app.handle())?;
                hotkeys::register(
                    app.handle(),
                    session.clone(),
                    last_frame,
                    cfg.debug_dir.clone(),
                )?;

                let intake_addr = cfg.sensor_addr.clone();
                let intake_session = session.clone();
                tauri::async_runtime::spawn(async move {
                    if let Err(err) = sensor::run_sensor_intake(intake_addr, intake_session).await {
                        log::error!("sensor intake stopped: {err:#}");
                    }
                });

                tauri::async_runtime::spawn(uploader::run_uploader(
                    cfg.clone(),
                    classifier.clone(),
                ));

                app.manage(AppState {
                    cfg,
                    session,
                    classifier,
                    detection_enabled: AtomicBool::new(true),
                });

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            set_detection_enabled,
            detection_enabled,
            set_overlay_interactive,
            fetch_education,
            list_history,
            classifier_health,
            frames_dir,
            reveal_frames_dir,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
