use colored::Colorize;
use serde::Serialize;

use crate::error::{Result, TasklaneError};
use crate::model::User;
use crate::rpc::Procedure;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
}

pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        let truncated: String = text.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

/// Pretty mode indents; JSON mode prints one line.
pub fn print_json<T: Serialize + ?Sized>(value: &T, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(value)?),
        Format::Pretty => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

pub fn print_user(user: &User, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(user, format)?,
        Format::Pretty => {
            println!("[{}] {} <{}>", user.id, user.name.bold(), user.email);
            println!(
                "  {} {} | {} {}",
                "role:".dimmed(),
                role_label(user),
                "active:".dimmed(),
                user.active
            );
        }
    }
    Ok(())
}

pub fn print_users(users: &[User], format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(users, format)?,
        Format::Pretty => {
            if users.is_empty() {
                println!("{}", "No users.".dimmed());
                return Ok(());
            }
            println!(
                "{:>4} {:24} {:28} {:8} ACTIVE",
                "ID", "NAME", "EMAIL", "ROLE"
            );
            println!("{}", "-".repeat(72));
            for user in users {
                let active = if user.active {
                    "yes".green()
                } else {
                    "no".red()
                };
                println!(
                    "{:>4} {:24} {:28} {:8} {}",
                    user.id,
                    truncate(&user.name, 24),
                    truncate(&user.email, 28),
                    user.role,
                    active
                );
            }
        }
    }
    Ok(())
}

fn role_label(user: &User) -> colored::ColoredString {
    if user.is_admin() {
        user.role.as_str().yellow().bold()
    } else {
        user.role.as_str().normal()
    }
}

pub fn print_procedures(procedures: &[Procedure], format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(procedures, format)?,
        Format::Pretty => {
            for procedure in procedures {
                let access = if procedure.public {
                    "public".green()
                } else {
                    "session".dimmed()
                };
                println!(
                    "{:24} {:8} {}",
                    procedure.name.cyan(),
                    access,
                    procedure.summary
                );
            }
        }
    }
    Ok(())
}

/// Failures go to stderr: JSON `{"error", "message"}` or a plain line.
pub fn print_error(err: &TasklaneError, format: Format) {
    match format {
        Format::Json => {
            let body = serde_json::json!({
                "error": err.code(),
                "message": err.to_string(),
            });
            eprintln!("{body}");
        }
        Format::Pretty => eprintln!("{} {}", "error:".red().bold(), err),
    }
}
