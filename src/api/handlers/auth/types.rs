//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OnlineAdmin {
    pub user_id: String,
    pub email: String,
    pub idle_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn verify_otp_request_round_trips() -> Result<()> {
        let request = VerifyOtpRequest {
            email: "ops@mdrecords.dev".to_string(),
            otp: "004217".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let otp = value
            .get("otp")
            .and_then(serde_json::Value::as_str)
            .context("missing otp")?;
        assert_eq!(otp, "004217");
        let decoded: VerifyOtpRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.email, "ops@mdrecords.dev");
        Ok(())
    }

    #[test]
    fn session_response_serializes_role() -> Result<()> {
        let response = SessionResponse {
            user_id: "00000000-0000-0000-0000-000000000000".to_string(),
            email: "ops@mdrecords.dev".to_string(),
            display_name: None,
            role: "superadmin".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(
            value.get("role").and_then(serde_json::Value::as_str),
            Some("superadmin")
        );
        Ok(())
    }
}
