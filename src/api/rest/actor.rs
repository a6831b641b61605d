use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::{Actor, ActorType};

pub const ROLE_HEADER: &str = "x-actor-role";
pub const ID_HEADER: &str = "x-actor-id";

/// Caller identity as forwarded by the auth gateway.
#[derive(Debug, Clone, Copy)]
pub struct CurrentActor(pub Actor);

impl CurrentActor {
    pub fn id(&self) -> Uuid {
        // Extraction guarantees an id for every role it accepts.
        self.0.id.unwrap_or_default()
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require(ActorType::Admin)
    }

    pub fn require_driver(&self) -> Result<Uuid, AppError> {
        self.require(ActorType::Driver)?;
        Ok(self.id())
    }

    pub fn require_client(&self) -> Result<Uuid, AppError> {
        self.require(ActorType::Client)?;
        Ok(self.id())
    }

    /// Admins see everything, clients only their own rows.
    pub fn require_admin_or_client(&self, client_id: Uuid) -> Result<(), AppError> {
        match self.0.actor_type {
            ActorType::Admin => Ok(()),
            ActorType::Client if self.id() == client_id => Ok(()),
            _ => Err(AppError::Forbidden("access denied".to_string())),
        }
    }

    fn require(&self, wanted: ActorType) -> Result<(), AppError> {
        if self.0.actor_type == wanted {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "this operation requires the {} role",
                role_name(wanted)
            )))
        }
    }
}

fn role_name(actor_type: ActorType) -> &'static str {
    match actor_type {
        ActorType::Admin => "admin",
        ActorType::Client => "client",
        ActorType::Driver => "driver",
        ActorType::System => "system",
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| AppError::Unauthorized(format!("malformed {name} header")))
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = header(parts, ROLE_HEADER)?;
        let id = Uuid::parse_str(header(parts, ID_HEADER)?.trim())
            .map_err(|_| AppError::Unauthorized(format!("malformed {ID_HEADER} header")))?;

        let actor = match role.trim().to_ascii_lowercase().as_str() {
            "admin" => Actor::admin(id),
            "client" => Actor::client(id),
            "driver" => Actor::driver(id),
            other => {
                return Err(AppError::Unauthorized(format!("unknown actor role: {other}")));
            }
        };

        Ok(CurrentActor(actor))
    }
}
