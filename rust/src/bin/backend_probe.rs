//! Smoke test against a live project: sign in, read the profile, list artists.
//!
//! usage: backend_probe <supabase_url> <anon_key> [email password] [--verified] [--timeout SECS]

use std::time::{Duration, Instant};

use artisthub_core::backend::{ArtistFilter, Backend, SupabaseBackend, SupabaseEndpoint};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let usage = "usage: backend_probe <supabase_url> <anon_key> [email password] [--verified] [--timeout SECS]";
    let mut positional = Vec::new();
    let mut verified_only = false;
    let mut timeout = Duration::from_secs(10);
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--verified" {
            verified_only = true;
            continue;
        }
        if a == "--timeout" {
            let n = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("--timeout requires a number"))?;
            timeout = Duration::from_secs(n.parse()?);
            continue;
        }
        if a.starts_with("--") {
            return Err(anyhow::anyhow!("unknown arg: {a}"));
        }
        positional.push(a);
    }

    let (url, anon_key) = match (positional.first(), positional.get(1)) {
        (Some(u), Some(k)) => (u.clone(), k.clone()),
        _ => return Err(anyhow::anyhow!(usage)),
    };
    let credentials = match (positional.get(2), positional.get(3)) {
        (Some(e), Some(p)) => Some((e.clone(), p.clone())),
        (None, None) => None,
        _ => return Err(anyhow::anyhow!(usage)),
    };

    let backend = SupabaseBackend::new(Some(SupabaseEndpoint { url, anon_key }), timeout);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let mut events = backend.auth_events();

        if let Some((email, password)) = credentials {
            let started = Instant::now();
            let session = backend.sign_in_with_password(&email, &password).await?;
            println!(
                "sign_in: ok user_id={} in {}ms",
                session.user.id,
                started.elapsed().as_millis()
            );
            if let Ok(ev) = events.try_recv() {
                println!("auth event: {}", ev.tag());
            }

            match backend.artist(&session.user.id).await {
                Ok(Some(a)) => println!(
                    "profile: name={:?} verified={:?}",
                    a.name.unwrap_or_default(),
                    a.is_verified.unwrap_or(false)
                ),
                Ok(None) => println!("profile: none"),
                Err(e) => println!("profile: error {e}"),
            }
        }

        let started = Instant::now();
        let artists = backend
            .list_artists(ArtistFilter { verified_only })
            .await?;
        println!(
            "list_artists: {} rows in {}ms (verified_only={verified_only})",
            artists.len(),
            started.elapsed().as_millis()
        );
        for a in artists.iter().take(10) {
            println!("  {} {}", a.id, a.name.as_deref().unwrap_or("-"));
        }

        if let Err(e) = backend.sign_out().await {
            println!("sign_out: revoke failed: {e}");
        }
        anyhow::Ok(())
    })
}
