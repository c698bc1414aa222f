use crate::api::{ApiError, ApiErrorKind, ApiResult, AuthClient};
use crate::models::Session;
use crate::util::now_ms;
use leptos::logging::{log, warn};

/// Remote email/password identity provider.
pub(crate) trait IdentityService {
    async fn sign_in(&self, email: &str, password: &str) -> ApiResult<Session>;
    async fn sign_up(&self, email: &str, password: &str) -> ApiResult<Session>;
    async fn refresh(&self, session: &Session) -> ApiResult<Session>;
}

impl IdentityService for AuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> ApiResult<Session> {
        let res = self.sign_in_with_password(email, password).await?;
        Ok(res.into_session(now_ms()))
    }

    async fn sign_up(&self, email: &str, password: &str) -> ApiResult<Session> {
        let res = self.sign_up_with_password(email, password).await?;
        Ok(res.into_session(now_ms()))
    }

    async fn refresh(&self, session: &Session) -> ApiResult<Session> {
        let res = self.refresh_token(&session.refresh_token).await?;
        Ok(res.apply_to(session, now_ms()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FormField {
    Email,
    Password,
    General,
}

/// Classified authentication failure.
#[derive(Clone, Debug, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum AuthFailure {
    MissingCredentials,
    InvalidEmail,
    UserNotFound,
    WrongPassword,
    TooManyAttempts,
    #[strum(to_string = "email-already-registered")]
    EmailInUse,
    WeakPassword { min_length: usize },
    UserDisabled,
    /// Login attempt rejected with an unrecognised provider code.
    LoginRejected(String),
    /// Signup attempt rejected with an unrecognised provider code.
    SignupRejected(String),
    /// Network or other non-provider failure.
    Unexpected,
}

impl AuthFailure {
    /// Kebab-case class code, e.g. `weak-password`.
    pub fn class_code(&self) -> &str {
        self.as_ref()
    }

    pub fn from_login_error(e: &ApiError) -> Self {
        let Some(code) = provider_code(e) else {
            return Self::Unexpected;
        };
        match code {
            "INVALID_EMAIL" => Self::InvalidEmail,
            "EMAIL_NOT_FOUND" => Self::UserNotFound,
            // Returned instead of the two above when email enumeration protection is on.
            "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => Self::WrongPassword,
            "USER_DISABLED" => Self::UserDisabled,
            c if c.starts_with("TOO_MANY_ATTEMPTS") => Self::TooManyAttempts,
            other => Self::LoginRejected(other.to_string()),
        }
    }

    pub fn from_signup_error(e: &ApiError, min_length: usize) -> Self {
        let Some(code) = provider_code(e) else {
            return Self::Unexpected;
        };
        match code {
            "EMAIL_EXISTS" => Self::EmailInUse,
            "INVALID_EMAIL" => Self::InvalidEmail,
            "WEAK_PASSWORD" => Self::WeakPassword { min_length },
            other => Self::SignupRejected(other.to_string()),
        }
    }

    pub fn field(&self) -> FormField {
        match self {
            Self::InvalidEmail | Self::UserNotFound | Self::EmailInUse => FormField::Email,
            Self::WrongPassword | Self::WeakPassword { .. } => FormField::Password,
            _ => FormField::General,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::MissingCredentials => "Enter email and password.".to_string(),
            Self::InvalidEmail => "The email address is badly formatted.".to_string(),
            Self::UserNotFound => "No account found for this email address.".to_string(),
            Self::WrongPassword => "Incorrect password.".to_string(),
            Self::TooManyAttempts => "Too many attempts. Try again later.".to_string(),
            Self::EmailInUse => "This email address is already registered.".to_string(),
            Self::WeakPassword { min_length } => {
                format!("Password must be at least {min_length} characters.")
            }
            Self::UserDisabled => "This account has been disabled.".to_string(),
            Self::LoginRejected(code) => format!("Login failed. Error code: {code}"),
            Self::SignupRejected(code) => format!("Sign-up failed. Error code: {code}"),
            Self::Unexpected => "An unexpected error occurred. Try again.".to_string(),
        }
    }
}

fn provider_code(e: &ApiError) -> Option<&str> {
    if e.kind == ApiErrorKind::Rejected {
        e.code.as_deref()
    } else {
        None
    }
}

/// Field-scoped messages shown under the sign-in form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct FormErrors {
    pub email: Option<String>,
    pub password: Option<String>,
    pub general: Option<String>,
}

impl FormErrors {
    pub fn from_failure(failure: &AuthFailure) -> Self {
        let msg = Some(failure.message());
        match failure.field() {
            FormField::Email => Self {
                email: msg,
                ..Default::default()
            },
            FormField::Password => Self {
                password: msg,
                ..Default::default()
            },
            FormField::General => Self {
                general: msg,
                ..Default::default()
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Screen {
    SignIn,
    Workspace,
}

impl Screen {
    pub fn path(&self) -> &'static str {
        match self {
            Self::SignIn => "/",
            Self::Workspace => "/dashboard",
        }
    }
}

/// Where `screen` must send the user for the given session state, if anywhere.
pub(crate) fn redirect_for(screen: Screen, session: Option<&Session>) -> Option<Screen> {
    match (screen, session) {
        (Screen::SignIn, Some(_)) => Some(Screen::Workspace),
        (Screen::Workspace, None) => Some(Screen::SignIn),
        _ => None,
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AuthFailure> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AuthFailure::MissingCredentials);
    }
    Ok(())
}

/// Login, signup and session restore over an [`IdentityService`].
#[derive(Clone)]
pub(crate) struct SessionController<I> {
    identity: I,
    password_min_length: usize,
}

impl<I: IdentityService> SessionController<I> {
    pub fn new(identity: I, password_min_length: usize) -> Self {
        Self {
            identity,
            password_min_length,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthFailure> {
        validate_credentials(email, password)?;

        match self.identity.sign_in(email.trim(), password).await {
            Ok(session) => {
                log!("[auth] signed in as {}", session.email);
                Ok(session)
            }
            Err(e) => {
                let failure = AuthFailure::from_login_error(&e);
                warn!("[auth] login failed ({}): {e}", failure.class_code());
                Err(failure)
            }
        }
    }

    /// Register an account. The new account is not signed in; the caller only
    /// gets the registered email back for a confirmation notice.
    pub async fn signup(&self, email: &str, password: &str) -> Result<String, AuthFailure> {
        validate_credentials(email, password)?;
        if password.chars().count() < self.password_min_length {
            return Err(AuthFailure::WeakPassword {
                min_length: self.password_min_length,
            });
        }

        match self.identity.sign_up(email.trim(), password).await {
            Ok(session) => {
                log!("[auth] registered {}", session.email);
                if session.email.is_empty() {
                    Ok(email.trim().to_string())
                } else {
                    Ok(session.email)
                }
            }
            Err(e) => {
                let failure = AuthFailure::from_signup_error(&e, self.password_min_length);
                warn!("[auth] signup failed ({}): {e}", failure.class_code());
                Err(failure)
            }
        }
    }

    /// Revalidate a persisted session. Expired tokens are refreshed; a failed
    /// refresh drops the session.
    pub async fn restore(&self, session: Session, now_ms: i64) -> Option<Session> {
        if !session.is_expired(now_ms) {
            return Some(session);
        }

        match self.identity.refresh(&session).await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("[auth] session refresh failed: {e}");
                None
            }
        }
    }
}
