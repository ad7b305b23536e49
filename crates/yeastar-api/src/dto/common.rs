//! Common DTOs used across the API

use serde::{Deserialize, Serialize};
use validator::Validate;
use yeastar_core::traits::{PaginatedResponse, PaginationMeta};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data,
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: Some(message.into()),
        }
    }
}

/// Pagination query parameters
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaginationParams {
    /// Page number (1-indexed)
    #[serde(default = "default_page", deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub page: i64,

    /// Items per page
    #[serde(default = "default_per_page", deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1, max = 500))]
    pub per_page: i64,
}

/// Query strings inside a flattened struct arrive as text
fn deserialize_number_from_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct I64OrStringVisitor;

    impl<'de> Visitor<'de> for I64OrStringVisitor {
        type Value = i64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer or a string containing an integer")
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
            i64::try_from(value).map_err(de::Error::custom)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<i64, E> {
            value.trim().parse::<i64>().map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_any(I64OrStringVisitor)
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    50
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationParams {
    #[inline]
    pub fn offset(&self) -> i64 {
        (self.page - 1).max(0).saturating_mul(self.per_page)
    }

    #[inline]
    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn metadata(&self, total: i64) -> PaginationMeta {
        PaginationMeta::new(total, self.page, self.per_page)
    }

    pub fn paginate<T>(&self, data: Vec<T>, total: i64) -> PaginatedResponse<T> {
        PaginatedResponse {
            data,
            pagination: self.metadata(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_params_offset() {
        let params = PaginationParams {
            page: 3,
            per_page: 20,
        };
        assert_eq!(params.offset(), 40);
        assert_eq!(params.limit(), 20);
        assert_eq!(PaginationParams::default().offset(), 0);
    }

    #[test]
    fn test_pagination_bounds() {
        let params = PaginationParams {
            page: 0,
            per_page: 50,
        };
        assert!(params.validate().is_err());

        let params = PaginationParams {
            page: 1,
            per_page: 501,
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_huge_page_is_rejected_and_offset_saturates() {
        let params = PaginationParams {
            page: i64::MAX,
            per_page: 500,
        };
        assert!(params.validate().is_err());
        assert_eq!(params.offset(), i64::MAX);

        let params = PaginationParams {
            page: 1_000_000,
            per_page: 500,
        };
        assert!(params.validate().is_ok());
        assert_eq!(params.offset(), 999_999 * 500);
    }

    #[test]
    fn test_api_response() {
        let resp = ApiResponse::success("test");
        assert!(resp.message.is_none());

        let resp = ApiResponse::with_message((), "deleted");
        assert_eq!(resp.message.as_deref(), Some("deleted"));
    }
}
