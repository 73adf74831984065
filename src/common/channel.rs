//! Delivery channel from the popup back to the opener window.
//!
//! The reconciler never reaches into ambient window globals; it is handed a
//! send-and-close capability instead, so tests can substitute a recording
//! fake. The production implementation renders the popup's terminal HTML
//! document, whose script performs the actual cross-window send and closes
//! the window.

use thiserror::Error;

use super::types::Envelope;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("no opener window is reachable")]
    OpenerUnreachable,
    #[error("envelope could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Send-and-close capability owned by exactly one reconciler. The send is
/// fire-and-forget; `close` must fire exactly once per popup life,
/// regardless of delivery success.
pub trait OpenerChannel {
    fn deliver(&mut self, envelope: &Envelope) -> Result<(), ChannelError>;
    fn close(&mut self);
}

/// Renders the terminal popup page: a neutral processing notice plus a
/// script that posts the envelope to the opener and closes the window.
pub struct PageChannel {
    diagnostics: bool,
    page: Option<String>,
    closed: bool,
}

impl PageChannel {
    pub fn new(diagnostics: bool) -> Self {
        PageChannel {
            diagnostics,
            page: None,
            closed: false,
        }
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// The document to serve back to the popup. If no envelope was ever
    /// delivered the page still closes the window, so a popup is never
    /// left open.
    pub fn into_page(self) -> String {
        self.page.unwrap_or_else(close_only_page)
    }
}

impl OpenerChannel for PageChannel {
    fn deliver(&mut self, envelope: &Envelope) -> Result<(), ChannelError> {
        let json = serde_json::to_string(envelope)?;
        // keep "</script>" out of the inline script block
        let json = json.replace('<', "\\u003c");

        let diagnostics = if self.diagnostics {
            let pretty = serde_json::to_string_pretty(envelope)?;
            format!("<pre>{}</pre>\n", escape_html(&pretty))
        } else {
            String::new()
        };

        self.page = Some(format!(
            r#"<!doctype html>
<html lang="ko">
<head>
<meta charset="utf-8">
<title>본인확인</title>
</head>
<body>
<p>본인확인 처리 중입니다. 이 창은 자동으로 닫힙니다.</p>
{diagnostics}<script>
(function () {{
  var envelope = {json};
  if (window.opener && !window.opener.closed) {{
    window.opener.postMessage(envelope, window.location.origin);
  }}
  window.close();
}})();
</script>
</body>
</html>
"#
        ));
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

fn close_only_page() -> String {
    r#"<!doctype html>
<html lang="ko">
<head>
<meta charset="utf-8">
<title>본인확인</title>
</head>
<body>
<p>본인확인 처리 중입니다. 이 창은 자동으로 닫힙니다.</p>
<script>window.close();</script>
</body>
</html>
"#
    .to_string()
}

/// Escapes text for embedding into HTML content or attribute values
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{CallbackParams, Envelope, EnvelopeKind, ENVELOPE_SOURCE};

    fn sample_envelope() -> Envelope {
        let params = CallbackParams::from_query("serviceType=FIND_ID&status=id_sent&email=a%40b.com");
        Envelope::base(EnvelopeKind::Success, &params)
    }

    #[test]
    fn test_page_embeds_envelope_and_closes() {
        let mut channel = PageChannel::new(false);
        channel.deliver(&sample_envelope()).unwrap();
        channel.close();

        assert!(channel.closed());
        let page = channel.into_page();
        assert!(page.contains(ENVELOPE_SOURCE));
        assert!(page.contains("postMessage"));
        assert!(page.contains("window.close()"));
        assert!(page.contains(r#""type":"SUCCESS""#));
    }

    #[test]
    fn test_page_guards_against_script_breakout() {
        let params =
            CallbackParams::from_query("serviceType=FIND_ID&status=fail&message=%3C%2Fscript%3E");
        let mut envelope = Envelope::base(EnvelopeKind::Fail, &params);
        envelope.error = envelope.message.clone();

        let mut channel = PageChannel::new(false);
        channel.deliver(&envelope).unwrap();
        let page = channel.into_page();

        assert!(!page.contains("</script></script>"));
        assert!(page.contains("\\u003c/script>"));
    }

    #[test]
    fn test_diagnostics_block_is_opt_in() {
        let mut channel = PageChannel::new(false);
        channel.deliver(&sample_envelope()).unwrap();
        assert!(!channel.into_page().contains("<pre>"));

        let mut channel = PageChannel::new(true);
        channel.deliver(&sample_envelope()).unwrap();
        assert!(channel.into_page().contains("<pre>"));
    }

    #[test]
    fn test_undelivered_page_still_closes_window() {
        let mut channel = PageChannel::new(false);
        channel.close();
        let page = channel.into_page();

        assert!(page.contains("window.close()"));
        assert!(!page.contains("postMessage"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }
}
