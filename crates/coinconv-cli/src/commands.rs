//! One-shot commands and the output they print.

use anyhow::{Context, Result};
use chrono::Utc;
use coinconv_core::auth::SessionStatus;
use coinconv_core::converter::format_amount;
use coinconv_core::{AuthError, CurrencyCode};

use crate::context::AppContext;

/// Read the password without echo. Runs off the async runtime.
pub async fn prompt_password() -> Result<String> {
    tokio::task::spawn_blocking(|| rpassword::prompt_password("Password: "))
        .await
        .context("Password prompt failed")?
        .context("Failed to read password")
}

pub async fn login(ctx: &mut AppContext, email: &str, remember: bool, transient_hint: bool) -> Result<()> {
    let password = prompt_password().await?;

    match ctx.auth.sign_in(email, &password, remember).await {
        Ok(claims) => {
            println!("Signed in as {}", claims.display_name());
            if !remember && transient_hint {
                println!("Token kept for this process only. Use --remember to stay signed in.");
            }
            ctx.config.last_email = Some(email.trim().to_string());
            if let Err(e) = ctx.config.save() {
                tracing::warn!(error = %e, "Failed to save config");
            }
            Ok(())
        }
        Err(AuthError::SignIn(message)) => anyhow::bail!("Sign-in failed: {}", message),
        Err(e) => Err(e.into()),
    }
}

pub fn logout(ctx: &AppContext) {
    let was_signed_in = ctx.session.is_authenticated();
    ctx.auth.sign_out();
    if was_signed_in {
        println!("Signed out");
    } else {
        println!("Not signed in");
    }
}

pub async fn whoami(ctx: &AppContext, json: bool) -> Result<()> {
    let Some(claims) = ctx.session.claims() else {
        println!("Not signed in");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&claims)?);
        return Ok(());
    }

    println!("{}", claims.display_name());
    println!("  subject: {}", claims.sub);
    if let Some(ref email) = claims.email {
        println!("  email:   {}", email);
    }
    if let Some(ref role) = claims.role {
        println!("  role:    {}", role);
    }
    match claims.expires_at() {
        Some(at) => println!("  expires: {}", at.to_rfc3339()),
        None => println!("  expires: never"),
    }

    match ctx.auth.fetch_profile().await {
        Ok(Some(user)) => println!("  profile: {} <{}>", user.full_name(), user.email),
        Ok(None) => println!("  profile: session ended before the profile arrived"),
        Err(e) => println!("  profile: unavailable ({})", e),
    }
    Ok(())
}

pub fn status(ctx: &AppContext) {
    let snapshot = ctx.session.snapshot();
    let state = match ctx.session.status() {
        SessionStatus::Loading => "loading",
        SessionStatus::Anonymous => "anonymous",
        SessionStatus::Authenticated => "authenticated",
    };
    println!("Session:  {}", state);

    if let Some(claims) = snapshot.claims {
        println!("User:     {}", claims.display_name());
        if let Some(left) = claims.time_until_expiry(Utc::now()) {
            println!("Expires:  in {}m", left.num_minutes().max(0));
        }
    }

    let slots = ctx.session.store().slots();
    let mark = |present: bool| if present { "set" } else { "empty" };
    println!(
        "Storage:  durable {}, session {}",
        mark(slots.durable.is_some()),
        mark(slots.session.is_some())
    );
    println!("API:      {}", ctx.api.base_url());

    let cache_age = ctx
        .cache
        .as_ref()
        .and_then(|cache| cache.load_rates().ok().flatten())
        .map(|entry| entry.age_display())
        .unwrap_or_else(|| "never".to_string());
    println!("Rates:    updated {}", cache_age);
}

pub async fn convert(
    ctx: &AppContext,
    amount: f64,
    from: CurrencyCode,
    to: CurrencyCode,
    offline: bool,
) -> Result<()> {
    let (rates, source) = ctx.rates(false, offline).await;
    let conversion = rates.convert(amount, from, to)?;
    println!("{}", conversion);
    println!("{} ({})", conversion.rate_line(), source);
    Ok(())
}

pub async fn rates(ctx: &AppContext, refresh: bool) {
    let (rates, source) = ctx.rates(refresh, false).await;
    println!("Rates per 1 USD ({}):", source);
    for (code, rate) in rates.iter() {
        println!("  {:<5} {:>18}  {}", code.code(), format_amount(rate, code), code.display_name());
    }
}
