//! HTML page shells
//!
//! The login page and the admin pages are static shells; admin data is
//! loaded by the browser with its bearer credential. Everything under the
//! protected prefix sits behind the route interceptor.

use axum::{extract::Path, response::Html, routing::get, Router};

use crate::api::middleware::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page))
        .route("/admin", get(admin_home))
        .route("/admin/blog", get(admin_blog))
        .route("/admin/blog/new", get(admin_blog_new))
        .route("/admin/blog/edit/{id}", get(admin_blog_edit))
        .route("/admin/messages", get(admin_messages))
}

fn shell(title: &str, page: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="robots" content="noindex">
<title>{title}</title>
</head>
<body data-page="{page}">
{body}
</body>
</html>
"#,
        title = escape(title),
        page = escape(page),
        body = body,
    ))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const LOGIN_FORM: &str = r#"<main>
<h1>Admin Login</h1>
<p id="error" hidden></p>
<form id="login">
<label for="identity">Email</label>
<input id="identity" name="identity" type="text" autocomplete="username" required>
<label for="password">Password</label>
<input id="password" name="password" type="password" autocomplete="current-password" required>
<button type="submit">Sign in</button>
</form>
</main>
<script>
document.getElementById("login").addEventListener("submit", async (event) => {
  event.preventDefault();
  const error = document.getElementById("error");
  error.hidden = true;
  const response = await fetch("/api/v1/auth/login", {
    method: "POST",
    credentials: "same-origin",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({
      identity: document.getElementById("identity").value,
      password: document.getElementById("password").value,
    }),
  });
  if (response.ok) {
    const session = await response.json();
    sessionStorage.setItem("refresh_token", session.refresh_token);
    sessionStorage.setItem("id_token", session.id_token);
    window.location.assign("/admin/blog");
  } else {
    const body = await response.json().catch(() => ({}));
    error.textContent = (body.error && body.error.message) || "Invalid identity or password";
    error.hidden = false;
  }
});
</script>"#;

/// GET /login
async fn login_page() -> Html<String> {
    shell("Admin Login", "login", LOGIN_FORM)
}

/// GET /admin
async fn admin_home() -> Html<String> {
    shell(
        "Admin",
        "admin",
        r#"<nav><a href="/admin/blog">Blog posts</a> <a href="/admin/messages">Messages</a></nav><div id="app"></div>"#,
    )
}

/// GET /admin/blog
async fn admin_blog() -> Html<String> {
    shell(
        "Manage Blog Posts",
        "admin-blog",
        r#"<a href="/admin/blog/new">New post</a><div id="app"></div>"#,
    )
}

/// GET /admin/blog/new
async fn admin_blog_new() -> Html<String> {
    shell("New Blog Post", "admin-blog-new", r#"<div id="app"></div>"#)
}

/// GET /admin/blog/edit/{id}
async fn admin_blog_edit(Path(id): Path<String>) -> Html<String> {
    let body = format!(r#"<div id="app" data-post-id="{}"></div>"#, escape(&id));
    shell("Edit Blog Post", "admin-blog-edit", &body)
}

/// GET /admin/messages
async fn admin_messages() -> Html<String> {
    shell("Contact Messages", "admin-messages", r#"<div id="app"></div>"#)
}
