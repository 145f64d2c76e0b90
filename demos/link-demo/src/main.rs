use std::time::Duration;

use popbridge::prelude::*;
use popbridge::protocol::MessageBody;
use serde_json::json;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Simulated provider
// ---------------------------------------------------------------------------

/// What the provider page (or the person in front of it) does.
#[derive(Clone, Copy, Debug)]
enum Provider {
    /// Approves, posts a token and closes itself.
    Approve,
    /// Posts a bare `{success: true}`: the session already exists server-side.
    Confirm,
    /// Rejects the request.
    Deny,
    /// The user closes the popup without finishing.
    Abandon,
    /// Nobody ever answers.
    Hang,
}

impl Provider {
    /// Acts on `window` after a short "page load" delay.
    async fn act(self, window: MemoryWindow) {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let posted = match self {
            Self::Approve => window.post_and_close(&MessageBody::Success {
                token: "tok-7f3a".into(),
                user: json!({"id": 42, "name": "Ada"}),
            }),
            Self::Confirm => window.post_and_close(&MessageBody::Established),
            Self::Deny => window.post_body(&MessageBody::ProviderError {
                error: "account already linked to another user".into(),
            }),
            Self::Abandon => {
                window.user_close();
                Ok(0)
            }
            Self::Hang => Ok(0),
        };
        if let Err(e) = posted {
            tracing::warn!(window_id = %window.id(), error = %e, "provider could not post");
        }
    }
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

/// Runs one linking attempt against a simulated provider and returns the
/// outcome the caller would see.
async fn run_flow(
    linker: &Linker<MemoryHost>,
    provider: Provider,
    user_id: Option<&str>,
) -> Result<LinkResult, PopbridgeError> {
    let (tx, rx) = oneshot::channel();
    let handle = match user_id {
        Some(user_id) => linker.start_link(user_id, tx)?,
        None => linker.start_login(tx)?,
    };

    if let Some(window) = handle.popup().and_then(|id| linker.launcher().window(id)) {
        tokio::spawn(provider.act(window));
    }

    let state = handle.finished().await;
    tracing::info!(session_id = %handle.id(), %state, ?provider, "flow finished");
    rx.await
        .map_err(|_| PopbridgeError::Config("session ended without an outcome".into()))
}

fn report(label: &str, outcome: &LinkResult) {
    match outcome {
        Ok(credential) => match &credential.token {
            Some(token) => println!("{label:<10} linked   token={token}"),
            None => println!("{label:<10} linked   (existing session)"),
        },
        Err(reason) if reason.is_user_initiated() => println!("{label:<10} stopped  {reason}"),
        Err(reason) => println!("{label:<10} failed   {reason}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bus = MessageBus::new();
    let host = MemoryHost::new(bus.clone());
    let linker = LinkerBuilder::new()
        .provider_base("https://auth.example.com")
        .title("Link your account")
        .timeout(Duration::from_secs(3))
        .build(host.clone(), bus)?;

    let flows = [
        ("approve", Provider::Approve, Some("42")),
        ("login", Provider::Confirm, None),
        ("deny", Provider::Deny, Some("42")),
        ("abandon", Provider::Abandon, Some("42")),
        ("hang", Provider::Hang, None),
    ];
    for (label, provider, user_id) in flows {
        let outcome = run_flow(&linker, provider, user_id).await?;
        report(label, &outcome);
    }

    host.set_popup_blocker(true);
    let outcome = run_flow(&linker, Provider::Approve, Some("42")).await?;
    report("blocked", &outcome);

    Ok(())
}
