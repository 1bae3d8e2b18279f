use crate::config::Config;
use crate::identity::{IdentityStore, Session};
use crate::models::{ChatMessage, ContactDraft, Conversation, User, UserId};
use crate::net::connection::{ConnectionManager, ConnectionStatus};
use crate::sync::{
    ChatListSync, DirectorySync, LivenessMonitor, NewContactSync, SingleChatSync,
    SubmissionState,
};
use crate::views;
use anyhow::{anyhow, bail};
use chrono::Local;
use colored::*;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Command-line client. `args` includes the binary name.
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("chatsync")
        .to_string();

    let (config, rest) = Config::from_args(args.get(1..).unwrap_or_default())
        .map_err(|e| anyhow!("Configuration error: {}", e))?;

    let Some(command) = rest.first() else {
        print_usage(&bin);
        return Ok(());
    };

    let session = Session::open(IdentityStore::open(&config.data_dir)?)?;

    match command.as_str() {
        "login" => {
            let Some(raw) = rest.get(1) else {
                eprintln!("{}", format!("Usage: {} login <user_id>", bin).yellow());
                return Ok(());
            };
            let user_id: UserId = raw
                .parse()
                .map_err(|_| anyhow!("Not a user id: {}", raw))?;
            session.sign_up(user_id)?;
            println!("{} Signed in as {}", "✓".green().bold(), user_id.to_string().cyan());
        }
        "logout" => {
            session.sign_out()?;
            println!("{} Signed out", "✓".green().bold());
        }
        "whoami" => match session.user_id() {
            Some(id) => println!("{}", id.to_string().cyan()),
            None => println!("{}", "Not signed in".yellow()),
        },
        "chats" => {
            let query = rest[1..].join(" ");
            show_chats(&config, &session, &query).await?;
        }
        "chat" => {
            let Some(peer) = rest.get(1) else {
                eprintln!("{}", format!("Usage: {} chat <peer_id> [message]", bin).yellow());
                return Ok(());
            };
            let peer: UserId = peer
                .parse()
                .map_err(|_| anyhow!("Not a user id: {}", peer))?;
            let text = rest[2..].join(" ");
            show_chat(&config, &session, peer, &text).await?;
        }
        "users" => {
            let query = rest[1..].join(" ");
            show_users(&config, &session, &query).await?;
        }
        "add-contact" => {
            if rest.len() < 5 {
                eprintln!(
                    "{}",
                    format!(
                        "Usage: {} add-contact <first> <last> <country_code> <number> [display name]",
                        bin
                    )
                    .yellow()
                );
                return Ok(());
            }
            let display = rest[5..].join(" ");
            let draft = ContactDraft {
                first_name: rest[1].clone(),
                last_name: rest[2].clone(),
                country_code: rest[3].clone(),
                contact_no: rest[4].clone(),
                display_name: (!display.is_empty()).then_some(display),
            };
            add_contact(&config, &session, draft).await?;
        }
        "watch" => {
            watch_chats(&config, &session).await?;
        }
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

fn print_usage(bin: &str) {
    println!("{}", "ChatSync CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} [--host <host>] [--insecure] [--data-dir <dir>] <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {} <user_id>                 Sign in", "login".cyan());
    println!("  {}                          Sign out", "logout".cyan());
    println!("  {}                          Show the signed-in user", "whoami".cyan());
    println!("  {} [query]                   List conversations", "chats".cyan());
    println!("  {} <peer_id> [message]        Show a conversation, optionally sending first", "chat".cyan());
    println!("  {} [query]                   List registered users", "users".cyan());
    println!(
        "  {} <first> <last> <code> <number> [display]  Add a contact",
        "add-contact".cyan()
    );
    println!("  {}                           Follow the conversation list until Ctrl+C", "watch".cyan());
}

/// Open the session's connection and wait for it
async fn connect(config: &Config, session: &Session) -> anyhow::Result<ConnectionManager> {
    let user_id = session
        .user_id()
        .ok_or_else(|| anyhow!("Not signed in, run `login <user_id>` first"))?;

    let manager = ConnectionManager::new(config.clone());
    manager.set_identity(Some(user_id)).await?;
    manager.wait_until_connected(config.connect_timeout).await?;
    debug!("Connected as user {}", user_id);
    Ok(manager)
}

/// Wait for the first change on `rx`; false on timeout
async fn wait_for_update<T>(rx: &mut watch::Receiver<T>, limit: Duration) -> bool {
    matches!(timeout(limit, rx.changed()).await, Ok(Ok(())))
}

async fn show_chats(config: &Config, session: &Session, query: &str) -> anyhow::Result<()> {
    let manager = connect(config, session).await?;
    let chats = ChatListSync::mount(&manager);
    let mut updates = chats.watch();

    if !wait_for_update(&mut updates, config.request_timeout).await {
        warn!("No conversation list after {:?}", config.request_timeout);
    }
    print_conversations(&chats.view(query), chats.total_unread());

    chats.unmount();
    manager.shutdown().await;
    Ok(())
}

fn print_conversations(list: &[Conversation], total_unread: u32) {
    if list.is_empty() {
        println!("{}", "No conversations".yellow());
        return;
    }

    let now = Local::now().naive_local();
    println!(
        "{}",
        format!("Conversations ({}, {} unread)", list.len(), total_unread)
            .bright_cyan()
            .bold()
    );
    println!("{}", "─".repeat(60).dimmed());
    for c in list {
        let badge = views::unread_badge(c.unread_count);
        println!(
            "  {} {} {} {}",
            c.friend_name.bright_white().bold(),
            format!("#{}", c.friend_id).dimmed(),
            views::format_chat_time(&c.last_time_stamp, now).dimmed(),
            badge.green().bold()
        );
        println!("    {}", c.last_message);
    }
}

async fn show_chat(
    config: &Config,
    session: &Session,
    peer: UserId,
    text: &str,
) -> anyhow::Result<()> {
    let manager = connect(config, session).await?;
    let chat = SingleChatSync::mount(&manager, peer);
    let mut messages = chat.watch_messages();

    if !wait_for_update(&mut messages, config.request_timeout).await {
        warn!("No history for user {} after {:?}", peer, config.request_timeout);
    }

    if !text.trim().is_empty() {
        if !chat.send(text) {
            bail!("Message not sent, connection is not open");
        }
        // The server echoes the message back as new_message
        let before = chat.messages().len();
        let echoed = timeout(
            config.request_timeout,
            messages.wait_for(|m| m.len() > before),
        )
        .await;
        if !matches!(echoed, Ok(Ok(_))) {
            warn!("Message to user {} not echoed after {:?}", peer, config.request_timeout);
        }
    }

    print_messages(chat.peer().as_ref(), peer, &chat.messages());

    chat.unmount();
    manager.shutdown().await;
    Ok(())
}

fn print_messages(friend: Option<&User>, peer: UserId, messages: &[ChatMessage]) {
    let title = friend
        .map(|u| u.display_name())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("User {}", peer));
    let presence = friend.and_then(|u| u.status.clone()).unwrap_or_default();

    println!("{} {}", title.bright_cyan().bold(), presence.dimmed());
    println!("{}", "─".repeat(60).dimmed());
    if messages.is_empty() {
        println!("{}", "No messages".yellow());
        return;
    }

    let now = Local::now().naive_local();
    for m in messages {
        let time = m
            .created_at
            .as_deref()
            .map(|t| views::format_chat_time(t, now))
            .unwrap_or_default();
        if m.from.id == peer {
            println!("  {} {}", "<".cyan(), m.message);
        } else {
            println!("  {} {}", ">".green(), m.message);
        }
        println!("    {} {:?}", time.dimmed(), m.status);
    }
}

async fn show_users(config: &Config, session: &Session, query: &str) -> anyhow::Result<()> {
    let manager = connect(config, session).await?;
    let directory = DirectorySync::mount(&manager);
    let mut updates = directory.watch();

    if !wait_for_update(&mut updates, config.request_timeout).await {
        warn!("No user directory after {:?}", config.request_timeout);
    }

    let users = directory.search(query);
    if users.is_empty() {
        println!("{}", "No users found".yellow());
    } else {
        println!("{}", format!("Users ({})", users.len()).bright_cyan().bold());
        println!("{}", "─".repeat(60).dimmed());
        for u in &users {
            let status = u.status.as_deref().unwrap_or("?");
            let status = if status.eq_ignore_ascii_case("online") {
                status.green()
            } else {
                status.dimmed()
            };
            println!(
                "  {} {} {} [{}]",
                format!("#{}", u.id).dimmed(),
                u.display_name().bright_white(),
                u.phone().cyan(),
                status
            );
        }
    }

    directory.unmount();
    manager.shutdown().await;
    Ok(())
}

async fn add_contact(config: &Config, session: &Session, draft: ContactDraft) -> anyhow::Result<()> {
    let manager = connect(config, session).await?;
    let contacts = NewContactSync::mount(&manager);
    let mut state = contacts.watch();

    if !contacts.submit(draft)? {
        bail!("Contact not submitted, connection is not open");
    }

    let verdict = timeout(
        config.request_timeout,
        state.wait_for(|s| matches!(s, SubmissionState::Success(_) | SubmissionState::Failure(_))),
    )
    .await;

    let answered = matches!(verdict, Ok(Ok(_)));

    match contacts.state() {
        SubmissionState::Success(message) if answered => {
            println!("{} {}", "✓".green().bold(), message)
        }
        SubmissionState::Failure(message) if answered => {
            eprintln!("{} {}", "✗".red().bold(), message.red())
        }
        _ => eprintln!("{}", "No answer from the server".yellow()),
    }

    contacts.unmount();
    manager.shutdown().await;
    Ok(())
}

async fn watch_chats(config: &Config, session: &Session) -> anyhow::Result<()> {
    let manager = connect(config, session).await?;
    let monitor = LivenessMonitor::start(&manager);
    let chats = ChatListSync::mount(&manager);

    let mut list = chats.watch();
    let mut state = manager.watch_state();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    println!("{}", "Watching conversations, Ctrl+C to stop".dimmed());
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = list.changed() => {
                if changed.is_err() {
                    break;
                }
                print_conversations(&chats.view(""), chats.total_unread());
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = state.borrow_and_update().status;
                if status != ConnectionStatus::Open {
                    eprintln!("{} Connection {:?}", "✗".red().bold(), status);
                    break;
                }
            }
        }
    }

    println!(
        "{}",
        format!(
            "Keepalive: {} sent, {} acknowledged",
            monitor.stats().pings_sent(),
            monitor.stats().acks_received()
        )
        .dimmed()
    );

    monitor.stop();
    chats.unmount();
    manager.shutdown().await;
    Ok(())
}
