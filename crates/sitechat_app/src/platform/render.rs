use sitechat_core::{ChatRow, CrawlRow, Message, Role, SessionView, StageRow, WidgetStatus};

pub fn stage_line(row: &StageRow) -> String {
    let mark = if row.completed { "x" } else { " " };
    format!("[{}] {:>3}% {}", mark, row.progress, row.message)
}

/// Stage rows that changed since `previous` was rendered.
pub fn changed_stages<'a>(previous: &[StageRow], current: &'a [StageRow]) -> Vec<&'a StageRow> {
    current
        .iter()
        .filter(|row| !previous.contains(row))
        .collect()
}

pub fn session_summary(view: &SessionView) -> String {
    match (&view.chat_id, &view.crawl_id) {
        (Some(chat_id), Some(crawl_id)) => format!(
            "Chat {} (crawl {}), {} pages, {} messages",
            chat_id, crawl_id, view.page_count, view.message_count
        ),
        (Some(chat_id), None) => format!(
            "Chat {}, {} pages, {} messages",
            chat_id, view.page_count, view.message_count
        ),
        _ => "No active chat".to_string(),
    }
}

pub fn chat_table(rows: &[ChatRow]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["No previous chats".to_string()];
    }
    rows.iter()
        .map(|row| {
            let marker = if row.active { "*" } else { " " };
            format!(
                "{} {}  {}  {} pages  {}",
                marker, row.id, row.title, row.page_count, row.created_at
            )
        })
        .collect()
}

pub fn crawl_line(row: &CrawlRow) -> String {
    format!(
        "{} {:?} {:.0}% depth {}/{} ({} indexed)",
        row.crawl_id, row.status, row.progress_percentage, row.depth.0, row.depth.1, row.pages_indexed
    )
}

pub fn message_block(message: &Message) -> String {
    let sender = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    };
    let mut block = format!("{}: {}", sender, message.content);
    for (index, source) in message.sources.iter().enumerate() {
        let title = if source.title.is_empty() {
            source.url.as_str()
        } else {
            source.title.as_str()
        };
        block.push_str(&format!(
            "\n  [{}] {} <{}> ({:.2})",
            index + 1,
            title,
            source.url,
            source.score
        ));
    }
    block
}

pub fn widget_status(status: &WidgetStatus) -> String {
    let mut line = format!(
        "Widget {:?}: {} pages indexed",
        status.phase(),
        status.indexed_page_count()
    );
    if let Some(error) = status.error() {
        line.push_str(&format!(" ({})", error));
    }
    line
}
