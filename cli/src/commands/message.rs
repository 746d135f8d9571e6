use anyhow::{Result, bail};
use rand::seq::IndexedRandom;
use tabled::{Table, Tabled, settings::Style};

use calgrid_core::service::{CalgridService, MessageMode};

use super::helpers::{resolve_message, truncate};

pub(crate) fn cmd_message_list(svc: &CalgridService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct MessageRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Message")]
        text: String,
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Default")]
        default: String,
    }

    let messages = svc.messages();
    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        eprintln!("No messages. Add one with: calgrid message add <text>");
        return Ok(());
    }

    let overlay = svc.message_mode() == MessageMode::Overlay;
    let rows: Vec<MessageRow> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| MessageRow {
            idx: i + 1,
            text: truncate(&m.text, 50),
            id: m.id.to_string(),
            // A synced copy of a default is editable even in overlay mode
            default: match (m.is_default(), overlay && svc.message_store().get(&m.id).is_none()) {
                (true, true) => "read-only".to_string(),
                (true, false) => "yes".to_string(),
                (false, _) => String::new(),
            },
        })
        .collect();

    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) fn cmd_message_add(svc: &mut CalgridService, text: &str, json: bool) -> Result<()> {
    let message = svc.add_message(text)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        println!("Added message: {}", message.text);
    }
    Ok(())
}

pub(crate) fn cmd_message_edit(
    svc: &mut CalgridService,
    reference: &str,
    text: &str,
    json: bool,
) -> Result<()> {
    let id = resolve_message(&svc.messages(), reference)?;
    let message = svc.edit_message(id, text)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        println!("Updated message: {}", message.text);
    }
    Ok(())
}

pub(crate) fn cmd_message_delete(
    svc: &mut CalgridService,
    reference: &str,
    json: bool,
) -> Result<()> {
    let id = resolve_message(&svc.messages(), reference)?;
    if !svc.delete_message(id)? {
        bail!("Message not found: {id}");
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted message {id}");
    }
    Ok(())
}

pub(crate) fn cmd_message_random(svc: &CalgridService, json: bool) -> Result<()> {
    let messages = svc.messages();
    let Some(message) = messages.choose(&mut rand::rng()) else {
        bail!("No messages. Add one with: calgrid message add <text>");
    };
    if json {
        println!("{}", serde_json::to_string_pretty(message)?);
    } else {
        println!("{}", message.text);
    }
    Ok(())
}
