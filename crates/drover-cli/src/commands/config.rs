use super::Context;
use crate::output::{print_table_header, print_table_row};
use anyhow::Result;
use clap::Subcommand;
use serde_json::json;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Change a setting; running workers pick it up on their next failure
    Set {
        /// Setting name
        key: String,
        /// New value
        value: String,
    },

    /// Show a setting
    Get {
        /// Setting name
        key: String,
    },

    /// Show all settings
    List,
}

pub async fn run(command: ConfigCommands, ctx: &Context) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            ctx.with_queue(|queue| {
                let (key, value) = (key.clone(), value.clone());
                async move { queue.config_set(&key, &value).await }
            })
            .await?;

            if ctx.output.is_text() {
                println!("{key} = {value}");
            } else {
                ctx.output.print_value(&json!({ "key": key, "value": value }))?;
            }
        }
        ConfigCommands::Get { key } => {
            let value = ctx
                .with_queue(|queue| {
                    let key = key.clone();
                    async move { queue.config_get(&key).await }
                })
                .await?;

            if ctx.output.is_text() {
                println!("{}", value.as_deref().unwrap_or("(not set)"));
            } else {
                ctx.output.print_value(&json!({ "key": key, "value": value }))?;
            }
        }
        ConfigCommands::List => {
            let settings = ctx.with_queue(|queue| async move { queue.config_list().await }).await?;

            if ctx.output.is_text() {
                print_table_header(&[("KEY", 16), ("VALUE", 20)]);
                for (key, value) in &settings {
                    print_table_row(&[(key, 16), (value, 20)]);
                }
            } else {
                let map: serde_json::Map<String, serde_json::Value> = settings
                    .into_iter()
                    .map(|(key, value)| (key, serde_json::Value::String(value)))
                    .collect();
                ctx.output.print_value(&map)?;
            }
        }
    }

    Ok(())
}
