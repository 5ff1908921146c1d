//! The login page served on `GET /auth`.
//!
//! Browser-driven e2e suites look for these exact elements (provider links, the visible
//! `pf-c-login` block, and the username/password inputs), so the markup is kept stable.

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>oauth-server</title>
</head>
<body>
<button onclick="">Log in with OpenShift</button>
<p>Log in with</p>
<ul>
<li><a href="" role="link" name="adm-auth">adm-auth</a></li>
<li><a href="" role="link" name="contributor-auth">contributor-auth</a></li>
<li><a href="" role="link" name="ldap-provider-qe">ldap-provider-qe</a></li>
</ul>
<div class="pf-c-login">
<!-- must not be empty, empty divs are not "visible" to selenium -->
<p>Log in to your account</p>
</div>
<form action="{action}" method="post">
<input type="text" name="username" id="inputUsername" placeholder="kube-admin" />
<input type="password" name="password" id="inputPassword" placeholder="" />
<input type="submit" value="Login">
</form>
</body>
</html>
"#;

/// Renders the login form, posting back to `action` (the original request URI).
pub fn render(action: &str) -> String {
    TEMPLATE.replace("{action}", &escape_html(action))
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
