use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of grant types this server dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantType {
    #[serde(rename = "client_credentials")]
    ClientCredentials,
    #[serde(rename = "code")]
    AuthorizationCode,
    #[serde(rename = "device_code")]
    DeviceCode,
    #[serde(rename = "refresh_token")]
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::ClientCredentials => "client_credentials",
            GrantType::AuthorizationCode => "code",
            GrantType::DeviceCode => "device_code",
            GrantType::RefreshToken => "refresh_token",
        }
    }

    /// Whether a successful grant of this type also yields a refresh token.
    pub fn issues_refresh_token(&self) -> bool {
        !matches!(self, GrantType::ClientCredentials)
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "code" => Ok(GrantType::AuthorizationCode),
            "device_code" => Ok(GrantType::DeviceCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            _ => Err(format!("Unsupported grant type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_grant_types() {
        for grant in [
            GrantType::ClientCredentials,
            GrantType::AuthorizationCode,
            GrantType::DeviceCode,
            GrantType::RefreshToken,
        ] {
            assert_eq!(grant.as_str().parse::<GrantType>(), Ok(grant));
        }
    }

    #[test]
    fn test_unknown_grant_type_is_an_error() {
        assert!("password".parse::<GrantType>().is_err());
        assert!("".parse::<GrantType>().is_err());
        assert!("CLIENT_CREDENTIALS".parse::<GrantType>().is_err());
    }

    #[test]
    fn test_only_client_credentials_skips_refresh_token() {
        assert!(!GrantType::ClientCredentials.issues_refresh_token());
        assert!(GrantType::RefreshToken.issues_refresh_token());
    }
}
