use anyhow::Result;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::data_models::User;
use crate::db::{ShelfRepo, UserRepo};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Hex SHA-256 of the lowercased email. Doubles as the user id.
pub fn email_hash(email: &str) -> String {
    hex::encode(Sha256::digest(email.to_lowercase().as_bytes()))
}

/// Display name derived from an email's local part.
pub fn display_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

pub struct Gravatar {
    client: reqwest::Client,
    base_url: String,
}

impl Gravatar {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn avatar_url(&self, hash: &str) -> String {
        format!("{}/avatar/{hash}?d=identicon&s=150", self.base_url)
    }

    pub fn signup_url(&self) -> String {
        format!("{}/signup", self.base_url)
    }

    /// Whether an avatar is registered for the hash. Any transport error
    /// counts as "no avatar".
    pub async fn exists(&self, hash: &str) -> bool {
        let url = format!("{}/avatar/{hash}?d=404", self.base_url);
        match self.client.get(&url).send().await {
            Ok(res) => res.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::warn!("gravatar probe failed for {hash}: {e}");
                false
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject
    pub sub: String,
    /// Issued At
    pub iat: usize,
    /// Expires At
    pub exp: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    Decoding(jsonwebtoken::errors::Error),
    #[error("Error while encoding token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("Missing user id")]
    MissingSubject,
}

/// Signs and verifies the bearer tokens handed out at login.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: &str) -> Result<String, TokenError> {
        if user_id.is_empty() {
            return Err(TokenError::MissingSubject);
        }

        let iat = Utc::now().timestamp() as usize;
        let ttl = usize::try_from(self.ttl.as_secs()).unwrap_or(usize::MAX);
        let claims = TokenClaims {
            sub: user_id.to_string(),
            iat,
            exp: iat.saturating_add(ttl),
        };

        encode(&Header::default(), &claims, &self.encoding).map_err(TokenError::Encoding)
    }

    /// Returns the user id carried by a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        decode::<TokenClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims.sub)
            .map_err(TokenError::Decoding)
    }
}

#[derive(Debug)]
pub enum LoginOutcome {
    /// No Gravatar is registered for the email.
    NoGravatar,
    SignedIn { user: User, created: bool },
}

/// Email login: the Gravatar must exist, then the user is created or
/// refreshed and their default shelves are ensured.
pub async fn login(
    gravatar: &Gravatar,
    users: &UserRepo,
    shelves: &ShelfRepo,
    email: &str,
) -> Result<LoginOutcome> {
    let hash = email_hash(email);
    if !gravatar.exists(&hash).await {
        return Ok(LoginOutcome::NoGravatar);
    }

    let name = display_name(email);
    let avatar = gravatar.avatar_url(&hash);

    let stored = match users.find_by_email(email).await? {
        Some(user) => Some(user),
        // the id ignores case, so a differently cased address is the same user
        None => users.find_by_id(&hash).await?,
    };

    let (user, created) = match stored {
        Some(existing) if existing.name == name && existing.avatar == avatar => (existing, false),
        Some(existing) => {
            // non-fatal, keep serving the stored profile if the refresh fails
            if let Err(e) = users.update_profile(&existing.id, &name, &avatar).await {
                tracing::warn!("could not refresh profile of {}: {e:#}", existing.id);
                (existing, false)
            } else {
                let refreshed = User { name, avatar, ..existing };
                (refreshed, false)
            }
        }
        None => {
            let user = User::new(hash.clone(), name, email.to_string(), avatar);
            let created = users.insert_if_absent(&user).await?;
            match users.find_by_id(&hash).await? {
                Some(stored) => (stored, created),
                None => anyhow::bail!("user {} vanished after insert", user.id),
            }
        }
    };

    if let Err(e) = shelves.ensure_defaults(&user.id).await {
        tracing::error!("ensure default shelves for {}: {e:#}", user.id);
    }

    Ok(LoginOutcome::SignedIn { user, created })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_hash_ignores_case() {
        assert_eq!(email_hash("Reader@Example.com"), email_hash("reader@example.com"));
        assert_eq!(email_hash("reader@example.com").len(), 64);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("reader@example.com"), "reader");
        assert_eq!(display_name("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_avatar_url() {
        let gravatar = Gravatar::new("https://www.gravatar.com/").unwrap();
        assert_eq!(
            gravatar.avatar_url("abc"),
            "https://www.gravatar.com/avatar/abc?d=identicon&s=150"
        );
    }

    #[test]
    fn test_token_round_trip() {
        let issuer = TokenIssuer::new("my-secret-key", Duration::from_secs(60));
        let token = issuer.issue("user123").unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), "user123");
    }

    #[test]
    fn test_token_rejects_other_secret() {
        let issuer = TokenIssuer::new("my-secret-key", Duration::from_secs(60));
        let other = TokenIssuer::new("another-key", Duration::from_secs(60));
        let token = issuer.issue("user123").unwrap();
        assert!(matches!(other.verify(&token), Err(TokenError::Decoding(_))));
    }

    #[test]
    fn test_token_requires_subject() {
        let issuer = TokenIssuer::new("my-secret-key", Duration::from_secs(60));
        assert!(matches!(issuer.issue(""), Err(TokenError::MissingSubject)));
    }

    #[test]
    fn test_token_with_huge_ttl() {
        let issuer = TokenIssuer::new("my-secret-key", Duration::from_secs(u64::MAX));
        let token = issuer.issue("user123").unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), "user123");
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let issuer = TokenIssuer::new("my-secret-key", Duration::from_secs(60));
        assert!(matches!(
            issuer.verify("invalid-token"),
            Err(TokenError::Decoding(_))
        ));
    }

    /// Local stand-in for Gravatar that knows every hash.
    async fn gravatar_with_every_avatar() -> Gravatar {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app =
            axum::Router::new().route("/avatar/:hash", axum::routing::get(|| async { "ok" }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Gravatar::new(format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    #[ignore = "needs a running MongoDB at MONGO_URI"]
    async fn test_login_ignores_email_case() -> Result<()> {
        use crate::db::test_utils::{cleanup_test_db, create_test_db};

        let (db, db_name) = create_test_db().await?;
        let users = UserRepo::new(&db);
        let shelves = ShelfRepo::new(&db);
        let gravatar = gravatar_with_every_avatar().await;

        let first = match login(&gravatar, &users, &shelves, "reader@example.com").await? {
            LoginOutcome::SignedIn { user, created } => {
                assert!(created);
                user
            }
            other => panic!("unexpected outcome: {other:?}"),
        };

        match login(&gravatar, &users, &shelves, "Reader@Example.com").await? {
            LoginOutcome::SignedIn { user, created } => {
                assert!(!created);
                assert_eq!(user.id, first.id);
                assert_eq!(user.email, "reader@example.com");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(users.list_all().await?.len(), 1);

        cleanup_test_db(&db, &db_name).await?;
        Ok(())
    }
}
