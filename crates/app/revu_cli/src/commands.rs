//! Command implementations over a file-backed session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use revu_core::auth::AuthError;
use revu_core::auth::http::HttpTransport;
use revu_core::auth::service::{AuthSessionService, SessionEvent};
use revu_core::auth::state::{self, AuthStateStore};
use revu_core::config::SessionConfig;
use revu_core::models::auth::{Credentials, DeviceInfo};
use revu_core::notify::{NoticeLevel, Notifier};
use revu_core::storage::FileStore;
use tokio::sync::broadcast::error::RecvError;

use crate::{Error, Result};

const SESSION_FILE: &str = "session.json";

/// Prints notices to the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Error => eprintln!("{message}"),
            NoticeLevel::Success | NoticeLevel::Info => println!("{message}"),
        }
    }
}

/// Everything a command needs.
pub struct Context {
    pub service: Arc<AuthSessionService>,
    pub auth: AuthStateStore,
    pub notifier: ConsoleNotifier,
}

impl Context {
    pub fn open(api_url: Option<&str>, data_dir: Option<&Path>) -> Result<Self> {
        let mut config = SessionConfig::from_env();
        if let Some(url) = api_url {
            config.api_url = url.to_string();
        }

        let path = session_path(data_dir)?;
        log::debug!("session file: {}", path.display());

        let transport = HttpTransport::new(&config.api_url)?;
        let service = AuthSessionService::new(
            Arc::new(FileStore::open(path)),
            Arc::new(transport),
            config,
        );

        let ctx = Self {
            service: Arc::new(service),
            auth: AuthStateStore::new(),
            notifier: ConsoleNotifier,
        };
        state::bootstrap(&ctx.auth, &ctx.service);
        Ok(ctx)
    }
}

fn session_path(data_dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::data_dir()
            .map(|dir| dir.join("revu"))
            .ok_or_else(|| Error::Custom("Could not determine a data directory".into()))?,
    };
    Ok(dir.join(SESSION_FILE))
}

fn user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

pub async fn login(
    ctx: &Context,
    username: String,
    password: String,
    register: bool,
) -> Result<()> {
    let credentials = Credentials::new(username, password);
    let user = state::login(&ctx.auth, &ctx.service, &credentials).await?;
    ctx.notifier
        .success(&format!("Signed in as {} ({})", user.display_name(), user.username));

    if register {
        match ctx
            .service
            .register_session(&DeviceInfo::current(user_agent()))
            .await
        {
            Some(session) => log::info!("registered device session {}", session.id),
            None => ctx.notifier.info("Device registration is unavailable"),
        }
    }
    Ok(())
}

pub fn logout(ctx: &Context) {
    let was_signed_in = ctx.auth.snapshot().is_authenticated;
    let redirect = state::logout(&ctx.auth, &ctx.service);
    log::debug!("logout redirect: {}", redirect.to);
    if was_signed_in {
        ctx.notifier.success("Signed out");
    } else {
        ctx.notifier.info("Not signed in");
    }
}

pub fn whoami(ctx: &Context) {
    match ctx.auth.snapshot().user {
        Some(user) if user.email.is_empty() => println!("{}", user.display_name()),
        Some(user) => println!("{} <{}>", user.display_name(), user.email),
        None => println!("Not signed in"),
    }
}

pub fn status(ctx: &Context) {
    let status = ctx.service.session_status();
    let Some(user) = status.user else {
        println!("Not signed in");
        return;
    };
    println!("Signed in as {}", user.username);
    if let Some(remaining) = status.remaining_ms {
        println!("Session expires in {}", format_duration(remaining));
    }
    if status.needs_refresh {
        println!("Refresh due");
    }
}

pub async fn refresh(ctx: &Context) -> Result<()> {
    if !ctx.auth.snapshot().is_authenticated {
        return Err(Error::Custom("Not signed in".into()));
    }
    if state::refresh(&ctx.auth, &ctx.service).await {
        ctx.notifier.success("Session is current");
        Ok(())
    } else {
        Err(AuthError::ExpiredSession.into())
    }
}

/// Run the refresh loop until Ctrl-C or until the session ends.
pub async fn watch(ctx: &Context, interval_secs: u64) -> Result<()> {
    if !ctx.auth.snapshot().is_authenticated {
        return Err(Error::Custom("Not signed in".into()));
    }

    let mut events = ctx.service.subscribe();
    let refresher = ctx
        .service
        .spawn_refresh_task(Duration::from_secs(interval_secs.max(1)));
    let listener = ctx.service.spawn_storage_listener();
    log::info!("watching session; press Ctrl-C to stop");

    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal.map_err(Error::from),
            event = events.recv() => match event {
                Ok(SessionEvent::Refreshed) => {
                    if let Some(user) = ctx.service.current_user() {
                        ctx.auth.refresh_succeeded(user);
                    }
                    ctx.notifier.info("Session refreshed");
                }
                Ok(SessionEvent::Expired | SessionEvent::LoggedOut(_)) => {
                    ctx.auth.logout_completed();
                    break Err(AuthError::ExpiredSession.into());
                }
                Ok(SessionEvent::StorageChanged) => state::reconcile(&ctx.auth, &ctx.service),
                Ok(SessionEvent::LoggedIn(_)) => {}
                Err(RecvError::Lagged(skipped)) => log::debug!("missed {skipped} session events"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    refresher.abort();
    listener.abort();
    outcome
}

pub async fn list_sessions(ctx: &Context) {
    let sessions = ctx.service.active_sessions().await;
    if sessions.is_empty() {
        println!("No active sessions");
        return;
    }
    for session in sessions {
        let marker = if session.is_current_device { "*" } else { " " };
        println!(
            "{marker} {}  {} on {}  last active {}",
            session.id,
            session.device_info.user_agent,
            session.device_info.platform,
            session.last_active
        );
    }
}

pub async fn revoke_session(ctx: &Context, id: &str) -> Result<()> {
    if !ctx.service.logout_session(id).await {
        return Err(Error::Custom(format!("Could not revoke session {id}")));
    }
    ctx.notifier.success(&format!("Revoked session {id}"));
    Ok(())
}

pub async fn revoke_other_sessions(ctx: &Context) -> Result<()> {
    if !ctx.service.logout_all_other_sessions().await {
        return Err(Error::Custom(
            "Could not revoke other sessions (is this device registered?)".into(),
        ));
    }
    ctx.notifier.success("Signed out of all other devices");
    Ok(())
}

fn format_duration(ms: i64) -> String {
    let minutes = ms.max(0) / 60_000;
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}
