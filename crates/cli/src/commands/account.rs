//! Session commands.

use mely_client::Storefront;
use secrecy::SecretString;
use serde_json::json;

use super::{Output, read_secret_line};

/// Sign in with a password read from stdin.
pub async fn login(
    storefront: &Storefront,
    username: &str,
    remember_me: bool,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let password = SecretString::from(read_secret_line("Password").await?);
    let role = storefront
        .account()
        .login(username, &password, remember_me)
        .await?;

    output.emit(
        &json!({ "role": role, "landing_path": role.landing_path() }),
        || format!("Signed in as {username} ({role})"),
    );
    Ok(())
}

/// Sign in with a Google identity token read from stdin.
pub async fn google_login(
    storefront: &Storefront,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let id_token = SecretString::from(read_secret_line("ID token").await?);
    let role = storefront.account().federated_login(&id_token).await?;

    output.emit(
        &json!({ "role": role, "landing_path": role.landing_path() }),
        || format!("Signed in with Google ({role})"),
    );
    Ok(())
}

pub async fn logout(storefront: &Storefront) {
    storefront.account().logout().await;
}

/// Show what the stored session says about the user.
pub fn whoami(storefront: &Storefront, output: Output) {
    let session = storefront.session();
    let claims = session.access_claims();
    let cart = session
        .refresh_claims()
        .and_then(|claims| claims.cart_id)
        .or_else(|| claims.as_ref().and_then(|claims| claims.cart_id));
    let role = storefront.account().role();

    output.emit(
        &json!({
            "authenticated": session.is_authenticated(),
            "role": role,
            "subject": claims.as_ref().and_then(|c| c.subject.clone()),
            "cart_id": cart,
            "access_expires_at": claims.as_ref().and_then(|c| c.expires_at),
        }),
        || {
            if !session.is_authenticated() {
                return "Not signed in".to_string();
            }
            let cart = cart.map_or_else(|| "none".to_string(), |id| id.to_string());
            format!("Role: {role}\nCart: {cart}")
        },
    );
}
