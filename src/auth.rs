//! OAuth2 authentication and the per-run session handle

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::path::Path;
use std::sync::Arc;

use crate::client::{GmailMailService, MailService};
use crate::error::{Result, TriageError};

/// Scopes needed to read items and manage labels
///
/// - gmail.modify: read items and change their labels (no permanent deletion)
/// - gmail.labels: create labels
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Credential context for one run.
///
/// Carries the authorized mail service when a credential is present. Passing
/// it explicitly keeps each run tied to exactly one account.
#[derive(Clone)]
pub struct Session {
    mailbox: Option<Arc<dyn MailService>>,
}

impl Session {
    pub fn authenticated(mailbox: Arc<dyn MailService>) -> Self {
        Self {
            mailbox: Some(mailbox),
        }
    }

    pub fn unauthenticated() -> Self {
        Self { mailbox: None }
    }

    pub fn is_authenticated(&self) -> bool {
        self.mailbox.is_some()
    }

    /// The authorized mail service, or `Unauthenticated`
    pub fn mailbox(&self) -> Result<Arc<dyn MailService>> {
        self.mailbox.clone().ok_or(TriageError::Unauthenticated)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

/// Build a session from cached credentials.
///
/// When no token has been cached yet the session is unauthenticated rather
/// than starting an interactive browser flow; run `auth` first.
pub async fn session_from_cache(credentials_path: &Path, token_cache_path: &Path) -> Result<Session> {
    if !token_cache_path.exists() {
        tracing::warn!("No cached token at {:?}", token_cache_path);
        return Ok(Session::unauthenticated());
    }

    let hub = initialize_gmail_hub(credentials_path, token_cache_path).await?;
    Ok(Session::authenticated(Arc::new(GmailMailService::new(hub))))
}

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Uses the installed-app flow with token persistence, so the browser
/// prompt only appears when no valid token is cached.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| TriageError::AuthError(format!("Failed to read credentials: {}", e)))?;

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| TriageError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Request every scope up front so later calls never trigger a second consent prompt
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| TriageError::AuthError(format!("Failed to obtain token: {}", e)))?;

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| TriageError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Restrict token file permissions to the owner
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
