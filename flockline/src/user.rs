//! User accounts and credential checks.
//!
//! Email uniqueness is enforced by the store rather than by a lookup: every
//! registration inserts an [`EmailClaim`] keyed by the normalised address in
//! the same batch as the user, and an insert only succeeds if the claim does
//! not exist yet.

use crate::actor::Role;
use crate::errors::{CommandError, CommandResult};
use crate::executor::{Command, Decision};
use crate::store::{Collection, Document, DocumentStore, DocumentWrites};
use crate::types::{Email, Password, RequiredText, Timestamp, UserId};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Message returned for every failed login, whatever the cause.
pub const INVALID_CREDENTIALS: &str = "Invalid email, password, or role combination";

/// Argon2id PHC string of a user's password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Hashes a password with a fresh random salt.
    pub fn hash(password: &Password) -> CommandResult<Self> {
        let salt_bytes: [u8; 16] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|error| CommandError::Internal(format!("salt encoding failed: {error}")))?;
        let digest = Argon2::default()
            .hash_password(password.as_ref().as_bytes(), &salt)
            .map_err(|error| CommandError::Internal(format!("password hashing failed: {error}")))?;
        Ok(Self(digest.to_string()))
    }

    /// Whether `password` matches this digest.
    pub fn verify(&self, password: &Password) -> bool {
        PasswordHash::new(&self.0).is_ok_and(|parsed| {
            Argon2::default()
                .verify_password(password.as_ref().as_bytes(), &parsed)
                .is_ok()
        })
    }
}

impl std::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordDigest(***)")
    }
}

/// Role-specific profile. The variant always matches the user's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RoleProfile {
    /// Administrator details
    Admin {
        /// Staff number
        employee_id: RequiredText,
        /// Department
        department: RequiredText,
    },
    /// Sales agent details
    Agent {
        /// Trading company
        company: RequiredText,
        /// Business address
        address: RequiredText,
    },
}

impl RoleProfile {
    /// The role this profile belongs to.
    pub const fn role(&self) -> Role {
        match self {
            Self::Admin { .. } => Role::Admin,
            Self::Agent { .. } => Role::Agent,
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User id
    pub id: UserId,
    /// Full name
    pub name: RequiredText,
    /// Login email
    pub email: Email,
    /// Hashed password
    pub password_hash: PasswordDigest,
    /// Contact phone number
    pub phone: RequiredText,
    /// Role and role-specific details
    #[serde(flatten)]
    pub profile: RoleProfile,
    /// Inactive users cannot log in
    pub is_active: bool,
    /// Creation time
    pub created_at: Timestamp,
    /// Last modification time
    pub updated_at: Timestamp,
}

impl User {
    /// The user's role.
    pub const fn role(&self) -> Role {
        self.profile.role()
    }
}

impl Document for User {
    type Id = UserId;
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> UserId {
        self.id
    }
}

/// Marker document owning an email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailClaim {
    /// The claimed address
    pub email: Email,
    /// Owner of the address
    pub user_id: UserId,
}

impl Document for EmailClaim {
    type Id = Email;
    const COLLECTION: Collection = Collection::EmailClaims;

    fn id(&self) -> Email {
        self.email.clone()
    }
}

/// Creates a user account.
#[derive(Debug, Clone)]
pub struct RegisterUser {
    /// Full name
    pub name: RequiredText,
    /// Login email
    pub email: Email,
    /// Plain-text password, hashed before storage
    pub password: Password,
    /// Contact phone number
    pub phone: RequiredText,
    /// Role and role-specific details
    pub profile: RoleProfile,
}

impl Command for RegisterUser {
    type Output = User;

    fn name(&self) -> &'static str {
        "register_user"
    }

    async fn decide<S: DocumentStore + Sync>(&self, store: &S) -> CommandResult<Decision<User>> {
        if store.load::<EmailClaim>(&self.email).await?.is_some() {
            return Err(CommandError::BusinessRuleViolation(
                "User already exists".to_string(),
            ));
        }

        let now = Timestamp::now();
        let user = User {
            id: UserId::new(),
            name: self.name.clone(),
            email: self.email.clone(),
            password_hash: PasswordDigest::hash(&self.password)?,
            phone: self.phone.clone(),
            profile: self.profile.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let claim = EmailClaim {
            email: user.email.clone(),
            user_id: user.id,
        };
        debug!(user_id = %user.id, role = %user.role(), "[user.register] registering user");

        let writes = DocumentWrites::new().insert(&user).insert(&claim).build()?;
        Ok(Decision::new(writes, user))
    }
}

/// Checks a login attempt. Email, password and declared role must all match
/// an active account.
pub async fn authenticate<S: DocumentStore>(
    store: &S,
    email: &Email,
    password: &Password,
    role: Role,
) -> CommandResult<User> {
    let rejected = || CommandError::Unauthorized(INVALID_CREDENTIALS.to_string());

    let Some(claim) = store.load::<EmailClaim>(email).await? else {
        debug!("[user.authenticate] unknown email");
        return Err(rejected());
    };
    let Some(user) = store.load::<User>(&claim.document.user_id).await? else {
        warn!(user_id = %claim.document.user_id, "[user.authenticate] email claim without user");
        return Err(rejected());
    };
    let user = user.document;

    if !user.is_active || user.role() != role || !user.password_hash.verify(password) {
        debug!(user_id = %user.id, "[user.authenticate] credentials rejected");
        return Err(rejected());
    }
    Ok(user)
}

/// Fetches one user.
pub async fn get_user<S: DocumentStore>(store: &S, user_id: UserId) -> CommandResult<User> {
    store
        .load::<User>(&user_id)
        .await?
        .map(|user| user.document)
        .ok_or_else(|| CommandError::not_found("User", user_id))
}
