use crate::error::OrchestratorError;
use url::Url;

/// Query parameter carrying the meeting passcode in join links.
pub const PASSWORD_PARAM: &str = "pwd";

/// What a worker needs to join: the numeric meeting number and its passcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingCredentials {
    pub meeting_number: String,
    pub password: String,
}

/// Pull credentials out of a join link such as
/// `https://zoom.us/j/123456789?pwd=abc`.
///
/// The meeting number is the first purely numeric path segment.
pub fn extract_credentials(link: &str) -> Result<MeetingCredentials, OrchestratorError> {
    let fail = |reason: &str| OrchestratorError::CredentialExtractionFailed {
        link: redact_link(link),
        reason: reason.to_string(),
    };

    let trimmed = link.trim();
    if trimmed.is_empty() {
        return Err(fail("join link is empty"));
    }

    let parsed = Url::parse(trimmed).map_err(|e| fail(&format!("invalid URL: {e}")))?;

    let meeting_number = parsed
        .path_segments()
        .into_iter()
        .flatten()
        .find(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
        .ok_or_else(|| fail("no numeric meeting id in path"))?;

    let password = parsed
        .query_pairs()
        .find(|(key, _)| key == PASSWORD_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| fail("no password parameter"))?;

    Ok(MeetingCredentials {
        meeting_number,
        password,
    })
}

/// The link with its query and fragment masked, for logs and status output.
pub fn redact_link(link: &str) -> String {
    let link = link.trim();
    match link.find(['?', '#']) {
        Some(idx) => format!("{}?<redacted>", &link[..idx]),
        None => link.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_standard_link() {
        let creds = extract_credentials("https://x/123456789?pwd=abc").unwrap();
        assert_eq!(creds.meeting_number, "123456789");
        assert_eq!(creds.password, "abc");
    }

    #[test]
    fn test_extract_picks_first_numeric_segment() {
        let link = "https://us02web.zoom.us/j/85212345678/extra/42?from=addon&pwd=Zx9.1";
        let creds = extract_credentials(link).unwrap();
        assert_eq!(creds.meeting_number, "85212345678");
        assert_eq!(creds.password, "Zx9.1");
    }

    #[test]
    fn test_extract_decodes_password() {
        let creds = extract_credentials("https://zoom.us/j/1?pwd=a%2Bb").unwrap();
        assert_eq!(creds.password, "a+b");
    }

    #[test]
    fn test_extract_failures() {
        for link in [
            "",
            "   ",
            "not a url",
            "https://zoom.us/j/abc?pwd=x",
            "https://zoom.us/j/123456789",
            "https://zoom.us/j/123456789?pwd=",
        ] {
            let err = extract_credentials(link).unwrap_err();
            assert!(
                matches!(err, OrchestratorError::CredentialExtractionFailed { .. }),
                "expected extraction failure for {link:?}"
            );
        }
    }

    #[test]
    fn test_failure_never_leaks_passcode() {
        let err = extract_credentials("https://zoom.us/j/abc?pwd=s3cret").unwrap_err();
        let message = err.to_string();
        assert!(!message.contains("s3cret"), "{message}");
        assert!(message.contains("https://zoom.us/j/abc?<redacted>"));

        assert_eq!(redact_link("https://zoom.us/j/1"), "https://zoom.us/j/1");
        assert_eq!(redact_link("https://zoom.us/j/1#pwd=x"), "https://zoom.us/j/1?<redacted>");
    }
}
