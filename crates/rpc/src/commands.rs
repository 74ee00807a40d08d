//! CLI commands

use esign_core::{
    NewPolicy, NewRequest, OriginMeta, PolicyUpdate, RequestFilter, RequestId, SignatureId,
    SignatureMethod, SignerAssignment, SlotId, UserId,
};
use serde::Serialize;

use crate::context::AppContext;
use crate::facade::SignCommand;

fn print_json<T: Serialize>(value: &T) -> Result<(), anyhow::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Register or replace a directory user
pub fn add_user(
    ctx: &AppContext,
    id: UserId,
    name: &str,
    role: &str,
    password: &str,
) -> Result<(), anyhow::Error> {
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    ctx.directory.upsert_user(id, name, role, password);
    ctx.save_directory()?;
    println!("✅ User {} ({}, {}) saved", id, name, role);
    Ok(())
}

/// Arguments of the `sign` command
pub struct SignArgs {
    pub entity_type: String,
    pub entity_id: i64,
    pub action: String,
    pub meaning: String,
    pub reason: Option<String>,
    pub method: Option<SignatureMethod>,
    pub slot: Option<SlotId>,
    pub password: String,
}

pub fn sign(ctx: &AppContext, actor: UserId, args: SignArgs) -> Result<(), anyhow::Error> {
    let cmd = SignCommand {
        entity_type: args.entity_type,
        entity_id: args.entity_id,
        action: args.action,
        meaning: args.meaning,
        reason: args.reason,
        method: args.method,
        credential: args.password,
        slot_id: args.slot,
        origin: OriginMeta {
            ip_address: None,
            user_agent: Some(format!("esign-cli/{}", env!("CARGO_PKG_VERSION"))),
        },
    };
    let outcome = ctx.facade.sign(&ctx.capabilities(), actor, cmd)?;
    print_json(&outcome)
}

pub fn decline(
    ctx: &AppContext,
    actor: UserId,
    slot: SlotId,
    reason: Option<String>,
) -> Result<(), anyhow::Error> {
    let detail = ctx.facade.decline(actor, slot, reason)?;
    print_json(&detail)
}

/// Arguments of the `request create` command
pub struct CreateRequestArgs {
    pub entity_type: String,
    pub entity_id: i64,
    pub action: String,
    pub title: String,
    pub description: Option<String>,
    pub signers: Vec<UserId>,
    pub required: Option<u32>,
    pub sequential: Option<bool>,
    pub expires_in_hours: Option<u32>,
}

pub fn create_request(
    ctx: &AppContext,
    actor: UserId,
    args: CreateRequestArgs,
) -> Result<(), anyhow::Error> {
    let mut new = NewRequest::new(
        args.entity_type,
        args.entity_id,
        args.action,
        args.title,
        args.signers.into_iter().map(SignerAssignment::new).collect(),
    );
    new.description = args.description;
    new.required_signatures = args.required;
    new.sequential = args.sequential;
    new.expires_at = args
        .expires_in_hours
        .map(|h| esign_core::expires_after(esign_core::signing_now(), h))
        .transpose()?;

    let detail = ctx.facade.create_request(&ctx.capabilities(), actor, new)?;
    print_json(&detail)
}

pub fn show_request(ctx: &AppContext, id: RequestId) -> Result<(), anyhow::Error> {
    print_json(&ctx.facade.get_request(id)?)
}

pub fn list_requests(ctx: &AppContext, filter: RequestFilter) -> Result<(), anyhow::Error> {
    print_json(&ctx.facade.list_requests(&filter)?)
}

pub fn cancel_request(ctx: &AppContext, actor: UserId, id: RequestId) -> Result<(), anyhow::Error> {
    print_json(&ctx.facade.cancel_request(actor, id)?)
}

/// Verify a signature; fails when it is tampered or revoked
pub fn verify(ctx: &AppContext, id: SignatureId) -> Result<(), anyhow::Error> {
    let verification = ctx.facade.verify_signature(id)?;
    print_json(&verification)?;

    if !verification.is_intact {
        anyhow::bail!("❌ Signature {} digest mismatch: record was altered", id);
    }
    if !verification.is_valid {
        anyhow::bail!("❌ Signature {} has been invalidated", id);
    }
    println!("✅ Signature {} intact and valid", id);
    Ok(())
}

pub fn invalidate(
    ctx: &AppContext,
    actor: UserId,
    id: SignatureId,
    reason: &str,
) -> Result<(), anyhow::Error> {
    print_json(&ctx.facade.invalidate_signature(actor, id, reason)?)
}

pub fn signatures(ctx: &AppContext, entity_type: &str, entity_id: i64) -> Result<(), anyhow::Error> {
    print_json(&ctx.facade.signatures_for_entity(entity_type, entity_id)?)
}

pub fn create_policy(ctx: &AppContext, actor: UserId, new: NewPolicy) -> Result<(), anyhow::Error> {
    print_json(&ctx.facade.create_policy(actor, new)?)
}

/// Update a policy from a JSON object of mutable fields
pub fn update_policy(
    ctx: &AppContext,
    actor: UserId,
    id: i64,
    fields_json: &str,
) -> Result<(), anyhow::Error> {
    let update: PolicyUpdate = serde_json::from_str(fields_json)
        .map_err(|e| anyhow::anyhow!("Invalid policy fields: {}", e))?;
    print_json(&ctx.facade.update_policy(actor, id, update)?)
}

pub fn list_policies(ctx: &AppContext) -> Result<(), anyhow::Error> {
    print_json(&ctx.facade.list_policies()?)
}

pub fn resolve_policy(ctx: &AppContext, entity_type: &str, action: &str) -> Result<(), anyhow::Error> {
    match ctx.facade.resolve_policy(entity_type, action)? {
        Some(policy) => print_json(&policy),
        None => {
            println!("No active policy for {}/{}", entity_type, action);
            Ok(())
        }
    }
}

pub fn sweep(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let expired = ctx.facade.expire_overdue(esign_core::signing_now())?;
    println!("✅ Expired {} overdue request(s)", expired.len());
    for request in &expired {
        println!("   {} {}", request.request_number, request.title);
    }
    Ok(())
}

pub fn stats(ctx: &AppContext) -> Result<(), anyhow::Error> {
    print_json(&ctx.facade.stats()?)
}
