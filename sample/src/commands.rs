use anyhow::{anyhow, Result};
use consent_core::{
    ConsentClient, ConsentError, ConsentGroup, ConsentInstance, ConsentLookup, MemberConsentResponse, SaveConsent,
};
use uuid::Uuid;

pub async fn list_groups(client: &ConsentClient) -> Result<()> {
    let groups = client.list_consent_groups().await?;
    if groups.is_empty() {
        println!("No consent groups are owned by subscription {}", client.options().subscription_id);
    }
    for group in groups {
        println!("{}  {}", group.id, group.name);
    }
    Ok(())
}

pub async fn show_group(client: &ConsentClient, id: Uuid) -> Result<()> {
    let group = client
        .get_consent_group(id)
        .await?
        .ok_or_else(|| anyhow!("consent group {id} not found"))?;
    print_group(&group);
    Ok(())
}

pub async fn review(client: &ConsentClient, key: &str, member: Option<&str>) -> Result<()> {
    match client.review_consent(key, member).await? {
        Some(consent) => print_instance(&consent),
        None => println!("No consent saved for key {key}"),
    }
    Ok(())
}

pub async fn get(client: &ConsentClient, key: &str, scopes: Vec<String>, member: Option<String>) -> Result<()> {
    let lookup = ConsentLookup {
        member,
        scopes: non_empty(scopes),
    };
    match client.get_consent(key, &lookup).await? {
        Some(consent) => print_member_consent(&consent),
        None => println!("No matching consent for key {key}"),
    }
    Ok(())
}

pub async fn save(
    client: &ConsentClient,
    key: &str,
    scopes: Vec<String>,
    authorized_members: Vec<String>,
    member: Option<String>,
) -> Result<()> {
    let save = SaveConsent {
        member,
        scopes: non_empty(scopes),
        authorized_members: non_empty(authorized_members),
    };
    let consent = client.save_consent(key, &save).await?;
    print_instance(&consent);
    Ok(())
}

pub async fn revoke(client: &ConsentClient, key: &str, member: Option<&str>) -> Result<()> {
    if client.delete_consent(key, member).await? {
        println!("Revoked consent for key {key}");
    } else {
        println!("No consent to revoke for key {key}");
    }
    Ok(())
}

/// An empty list on the command line means "not specified".
fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}

pub fn print_group(group: &ConsentGroup) {
    println!("Consent group {} ({})", group.name, group.id);
    if let Some(format) = &group.key_format {
        println!("  key format: {format}");
    }
    println!("  scopes: {}", group.scopes.join(", "));
    for member in &group.members {
        let r = member.roles;
        println!(
            "  member {} \"{}\" subscription {} read={} write={} delete={}",
            member.key, member.name, member.subscription_id, r.can_read, r.can_write, r.can_delete
        );
    }
}

pub fn print_instance(consent: &ConsentInstance) {
    println!(
        "Consent {} for key {} saved by {}: scopes [{}], authorized [{}]",
        consent.id,
        consent.key,
        consent.member,
        consent.scopes.join(", "),
        consent.authorized_members.join(", ")
    );
}

pub fn print_member_consent(consent: &MemberConsentResponse) {
    println!(
        "Consent for key {} visible to {}: scopes [{}]",
        consent.key,
        consent.member,
        consent.scopes.join(", ")
    );
}

/// Log a top-level failure; validation failures get one line per message.
pub fn report(err: &anyhow::Error) {
    if let Some(errors) = err.downcast_ref::<ConsentError>().and_then(ConsentError::validation_errors) {
        tracing::error!("{err}");
        for (field, messages) in errors.iter() {
            for message in messages {
                tracing::error!("{field}: {message}");
            }
        }
        return;
    }
    tracing::error!("{err:#}");
}
