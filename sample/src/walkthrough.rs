use anyhow::{anyhow, bail, Result};
use consent_core::{
    ConsentClient, ConsentGroupMember, ConsentGroupRequest, ConsentGroupSummary, ConsentLookup, ConsentOptions,
    ConsentRoles, SaveConsent,
};
use uuid::Uuid;

use crate::commands::{print_group, print_instance};
use crate::settings::AppConfiguration;

/// Save, review and revoke consent for the configured key, creating a
/// sample group first when the subscription owns none.
pub async fn run(client: &ConsentClient, settings: &AppConfiguration) -> Result<()> {
    let member = client.options().consent_member.clone();
    let group_id = resolve_group(client, settings).await?;
    let client = client.for_group(group_id);

    let group = client
        .get_consent_group(group_id)
        .await?
        .ok_or_else(|| anyhow!("consent group {group_id} not found"))?;
    print_group(&group);

    let key = settings.consent_key.as_str();
    let scope = settings.consent_scope.as_str();

    match client.get_consent(key, &ConsentLookup::scopes([scope])).await? {
        Some(existing) => {
            tracing::info!(key, scope, member = %existing.member, "consent already granted");
        }
        None => {
            tracing::info!(key, scope, "no consent yet, saving it");
            let save = SaveConsent::scopes([scope]).with_authorized_members([member.as_str()]);
            let saved = client.save_consent(key, &save).await?;
            tracing::info!(id = %saved.id, "saved consent");
        }
    }

    let reviewed = client
        .review_consent(key, None)
        .await?
        .ok_or_else(|| anyhow!("consent for key {key} disappeared before review"))?;
    print_instance(&reviewed);

    report_revoke(key, client.delete_consent(key, None).await?);

    match client.review_consent(key, None).await? {
        None => tracing::info!(key, "consent is gone after revoking"),
        Some(left) => tracing::warn!(key, id = %left.id, "consent still present after revoking"),
    }
    Ok(())
}

/// The configured group, else the subscription's only group, else a newly
/// created sample group.
async fn resolve_group(client: &ConsentClient, settings: &AppConfiguration) -> Result<Uuid> {
    let configured = client.options().consent_group_id;
    if !configured.is_nil() {
        return Ok(configured);
    }

    let groups = client.list_consent_groups().await?;
    match pick_group(&groups)? {
        Some(id) => {
            tracing::info!(group_id = %id, "using the subscription's consent group");
            Ok(id)
        }
        None => {
            let request = sample_group(client.options(), settings);
            let group = client.create_consent_group(&request).await?;
            tracing::info!(group_id = %group.id, name = %group.name, "created consent group");
            Ok(group.id)
        }
    }
}

fn pick_group(groups: &[ConsentGroupSummary]) -> Result<Option<Uuid>> {
    match groups {
        [] => Ok(None),
        [only] => Ok(Some(only.id)),
        _ => bail!(
            "subscription owns {} consent groups; set consent.consent_group_id to choose one",
            groups.len()
        ),
    }
}

fn report_revoke(key: &str, revoked: bool) -> bool {
    if revoked {
        tracing::info!(key, "revoked consent");
    } else {
        tracing::error!(key, "unable to revoke consent details for key");
    }
    revoked
}

fn sample_group(options: &ConsentOptions, settings: &AppConfiguration) -> ConsentGroupRequest {
    let display_name = title_case(&options.consent_member);
    let member = ConsentGroupMember {
        key: options.consent_member.clone(),
        name: display_name.clone(),
        subscription_id: options.subscription_id,
        roles: ConsentRoles::all(),
    };
    let request = ConsentGroupRequest::new(format!("{display_name} Sample Group"), vec![member])
        .with_scopes([settings.consent_scope.as_str()]);
    match settings.consent_key_format.as_deref() {
        Some(format) => request.with_key_format(format),
        None => request,
    }
}

/// Capitalize each word and lowercase the rest. Words written entirely in
/// capitals are treated as acronyms and kept.
fn title_case(text: &str) -> String {
    text.split_inclusive(char::is_whitespace)
        .map(|word| {
            let letters = word.trim_end();
            if letters.chars().any(char::is_lowercase) || !letters.chars().any(char::is_uppercase) {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                }
            } else {
                word.to_string()
            }
        })
        .collect()
}
