//! Caller identity extractors.
//!
//! Authentication happens upstream; the gateway forwards the signed-in
//! student as `X-Student-Id` and the acting administrator as
//! `X-Admin-Name`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};

use crate::error::ApiError;

pub const STUDENT_ID_HEADER: &str = "X-Student-Id";
pub const ADMIN_NAME_HEADER: &str = "X-Admin-Name";

/// Approver recorded when the admin gateway sends no name.
const DEFAULT_ADMIN_NAME: &str = "admin";

/// The student making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentIdentity(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for StudentIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(parts, STUDENT_ID_HEADER)
            .map(StudentIdentity)
            .ok_or_else(|| ApiError::Unauthorized("Missing student identity".into()))
    }
}

/// The administrator acting on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    pub name: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let name = header_value(parts, ADMIN_NAME_HEADER)
            .unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string());
        Ok(AdminIdentity { name })
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_student_identity_trimmed() {
        let mut parts = parts_with(&[(STUDENT_ID_HEADER, " 20231@school.kr ")]);
        let id = StudentIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(id.0, "20231@school.kr");
    }

    #[tokio::test]
    async fn test_student_identity_missing_or_blank() {
        let mut parts = parts_with(&[]);
        assert!(matches!(
            StudentIdentity::from_request_parts(&mut parts, &()).await,
            Err(ApiError::Unauthorized(_))
        ));

        let mut parts = parts_with(&[(STUDENT_ID_HEADER, "  ")]);
        assert!(StudentIdentity::from_request_parts(&mut parts, &())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_admin_identity_defaults() {
        let mut parts = parts_with(&[]);
        let admin = AdminIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(admin.name, "admin");

        let mut parts = parts_with(&[(ADMIN_NAME_HEADER, "Ms. Kim")]);
        let admin = AdminIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(admin.name, "Ms. Kim");
    }

    #[tokio::test]
    async fn test_student_identity_passes_generated_emails() {
        use fake::faker::internet::en::SafeEmail;
        use fake::Fake;

        for _ in 0..10 {
            let email: String = SafeEmail().fake();
            let mut parts = parts_with(&[(STUDENT_ID_HEADER, email.as_str())]);
            let id = StudentIdentity::from_request_parts(&mut parts, &())
                .await
                .unwrap();
            assert_eq!(id.0, email);
        }
    }
}
