//! HTML pages served by the candidate-invite endpoint.

const CHECKING_PROFILE: &str = "Checking your profile\u{2026}";
const REDIRECTING_SOON: &str = "You\u{2019}ll be redirected to the video interview shortly. \
The link was also sent to your email.";

/// Page that shows a short status message, then sends the browser to the
/// interview URL.
pub fn redirect_page(public_url: &str) -> String {
    // JSON string literals are valid JS literals; escape `<` so the value
    // cannot close the script element.
    let url_literal = js_literal(public_url);
    let message_literal = js_literal(REDIRECTING_SOON);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8" />
  <title>Preparing interview...</title>
</head>
<body>
  <h2 id="message">{CHECKING_PROFILE}</h2>
  <script>
    setTimeout(() => {{
      document.getElementById('message').innerText = {message_literal};
      setTimeout(() => {{
        window.location.href = {url_literal};
      }}, 5000);
    }}, 3000);
  </script>
</body>
</html>"#
    )
}

pub fn error_page(message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\" /></head>\n<body><h2>{}</h2></body>\n</html>",
        escape_html(message)
    )
}

fn js_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace('<', "\\u003c")
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_page_embeds_url_as_literal() {
        let html = redirect_page("https://app.hireflix.com/abc");
        assert!(html.contains(r#"window.location.href = "https://app.hireflix.com/abc";"#));
    }

    #[test]
    fn test_redirect_page_escapes_hostile_url() {
        let html = redirect_page("https://x/'</script><script>alert(1)//");
        assert!(!html.contains("</script><script>"));
        assert!(html.contains("\\u003c/script>"));
    }

    #[test]
    fn test_error_page_escapes_message() {
        let html = error_page("<b>nope</b>");
        assert!(html.contains("&lt;b&gt;nope&lt;/b&gt;"));
    }
}
