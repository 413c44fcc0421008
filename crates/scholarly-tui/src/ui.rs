use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use scholarly_core::{available_models, Agent, ChatProcess, MessageKind, ProcessKind, TreeRow};

use crate::app::{App, FocusPane, InputMode, Modal, Screen};

const SIDEBAR_WIDTH: u16 = 34;

/// Render `**bold**` spans; everything else is literal.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut current = String::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        match after.find("**") {
            Some(end) if end > 0 => {
                current.push_str(&rest[..start]);
                if !current.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current)));
                }
                spans.push(Span::styled(
                    after[..end].to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                rest = &after[end + 2..];
            }
            _ => {
                // No closing marker, keep it literal
                current.push_str(&rest[..start + 2]);
                rest = after;
            }
        }
    }
    current.push_str(rest);
    if !current.is_empty() {
        spans.push(Span::raw(current));
    }

    Line::from(spans)
}

/// Artifact lines: markdown headings get their own style, the rest goes
/// through `parse_markdown_line`.
fn artifact_line(text: &str) -> Line<'static> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('#') {
        let title = trimmed.trim_start_matches('#').trim();
        let level = trimmed.len() - trimmed.trim_start_matches('#').len();
        let color = if level <= 1 { Color::Cyan } else { Color::Blue };
        return Line::from(Span::styled(
            title.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
    }
    if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        let indent = text.len() - trimmed.len();
        let mut line = parse_markdown_line(item);
        line.spans.insert(0, Span::raw(format!("{}• ", " ".repeat(indent))));
        return line;
    }
    parse_markdown_line(text)
}

/// Rows a set of lines takes once wrapped to `width` columns
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    if width == 0 {
        return 0;
    }
    let width = width as usize;
    let rows: usize = lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum();
    rows.min(u16::MAX as usize) as u16
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

fn border_color(focused: bool) -> Color {
    if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let main_area = if app.sidebar_visible() {
        let [sidebar_area, main_area] =
            Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)]).areas(body_area);
        render_sidebar(app, frame, sidebar_area);
        main_area
    } else {
        app.sidebar_area = None;
        body_area
    };

    match app.screen {
        Screen::Welcome => render_welcome(app, frame, main_area),
        Screen::Chat => render_chat_screen(app, frame, main_area),
        Screen::Literature => render_papers_screen(app, frame, main_area),
    }

    render_footer(app, frame, footer_area);

    match app.modal {
        Some(Modal::NewProject(_)) | Some(Modal::Rename { .. }) | Some(Modal::SearchQuery(_)) => {
            render_topic_input(app, frame, area)
        }
        Some(Modal::ConfirmReset { .. }) => render_reset_confirm(app, frame, area),
        Some(Modal::ConfirmDelete { .. }) => render_delete_confirm(app, frame, area),
        Some(Modal::ModelPicker) => render_model_picker(app, frame, area),
        None => {}
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(" Scholarly ", Style::default().fg(Color::Cyan).bold())];

    if let Some(project) = app.active_project() {
        spans.push(Span::styled(project.topic.clone(), Style::default().fg(Color::White)));
        if let Some(phase) = app.current_phase() {
            spans.push(Span::styled(
                format!("  {}", phase.display_name()),
                Style::default().fg(Color::Yellow),
            ));
        }
    }

    spans.push(Span::styled(
        format!("  {}  v{}", app.settings.selected_model, env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::Gray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_sidebar(app: &mut App, frame: &mut Frame, area: Rect) {
    app.sidebar_area = Some(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::Sidebar)))
        .title(format!(" Projects ({}) ", app.tree.projects().len()));

    if app.tree.projects().is_empty() {
        let text = if app.projects_loaded {
            "No projects yet.\nPress n to create one."
        } else {
            "Loading projects..."
        };
        let placeholder = Paragraph::new(text)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let open = app
        .session
        .as_ref()
        .map(|s| (s.project_id().to_string(), s.process().kind()))
        .or_else(|| app.papers.as_ref().map(|p| (p.project_id.clone(), p.kind)));

    let projects = app.tree.projects();
    let items: Vec<ListItem> = app
        .tree
        .rows()
        .into_iter()
        .map(|row| match row {
            TreeRow::Project { index, expanded } => {
                let project = &projects[index];
                let marker = if expanded { "▾" } else { "▸" };
                ListItem::new(Line::from(vec![
                    Span::raw(format!("{} ", marker)),
                    Span::styled(project.topic.clone(), Style::default().bold()),
                ]))
            }
            TreeRow::Process { project, kind, locked } => {
                let summary = &projects[project];
                let is_open = open
                    .as_ref()
                    .is_some_and(|(id, k)| *id == summary.project_id && *k == kind);

                let style = if locked {
                    Style::default().fg(Color::DarkGray)
                } else if is_open {
                    Style::default().fg(Color::Green).bold()
                } else {
                    Style::default()
                };

                let mut spans = vec![Span::styled(format!("   {}", kind.display_name()), style)];
                if locked {
                    spans.push(Span::styled(" [locked]", Style::default().fg(Color::DarkGray)));
                } else if kind == ProcessKind::ResearchExperiment {
                    let done = [summary.research_definition_complete, summary.experiment_design_complete]
                        .iter()
                        .filter(|d| **d)
                        .count();
                    spans.push(Span::styled(
                        format!(" {}/2", done),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
                ListItem::new(Line::from(spans))
            }
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );

    frame.render_stateful_widget(list, area, &mut app.tree_state);
}

fn render_welcome(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = None;
    app.artifact_area = None;

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow).bold());
    let lines = vec![
        Line::from(Span::styled("Scholarly", Style::default().fg(Color::Cyan).bold())),
        Line::from(Span::styled(
            format!("Connected to {}", app.client.base_url()),
            Style::default().fg(Color::DarkGray),
        )),
        Line::default(),
        Line::from(vec![key("j/k"), Span::raw("  move through projects")]),
        Line::from(vec![key("Enter"), Span::raw("  expand a project or open a process")]),
        Line::from(vec![key("n"), Span::raw("  start a new research project")]),
        Line::from(vec![key("m"), Span::raw("  choose the model")]),
        Line::default(),
        Line::from(Span::styled(
            "Literature Search and Paper Writing unlock once both research phases are complete.",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let welcome = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    frame.render_widget(welcome, area);
}

/// Split the main area into left/right panes by the saved ratio
fn split_main(app: &App, area: Rect) -> (Rect, Rect) {
    let left = (app.settings.split_ratio * 100.0).round() as u16;
    let [left_area, right_area] = Layout::horizontal([
        Constraint::Percentage(left),
        Constraint::Percentage(100 - left),
    ])
    .areas(area);
    (left_area, right_area)
}

fn agent_style(agent: Agent) -> Style {
    match agent {
        Agent::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        Agent::System => Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        _ => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    }
}

fn advisor_for(process: ChatProcess) -> Agent {
    match process {
        ChatProcess::ResearchExperiment => Agent::ResearchAdvisor,
        ChatProcess::PaperWriting => Agent::PaperAdvisor,
    }
}

fn chat_lines(app: &App) -> Vec<Line<'static>> {
    let Some(session) = app.session.as_ref() else {
        return Vec::new();
    };

    if !session.is_loaded() && session.messages().is_empty() {
        return vec![Line::from(Span::styled(
            "Loading conversation...",
            Style::default().fg(Color::DarkGray),
        ))];
    }

    let mut lines: Vec<Line<'static>> = Vec::new();
    for msg in session.messages() {
        let mut label = vec![Span::styled(format!("{}:", msg.agent.display_name()), agent_style(msg.agent))];
        let time = msg.time_label();
        if !time.is_empty() {
            label.push(Span::styled(format!(" {}", time), Style::default().fg(Color::DarkGray)));
        }
        lines.push(Line::from(label));

        let body_style = match msg.kind {
            MessageKind::Error => Style::default().fg(Color::Red),
            MessageKind::PhaseReady | MessageKind::PhaseComplete => Style::default().fg(Color::Green),
            _ => Style::default(),
        };
        for line in msg.content.lines() {
            let line = if msg.agent.is_user() {
                Line::from(line.to_string())
            } else {
                parse_markdown_line(line)
            };
            lines.push(line.patch_style(body_style));
        }
        lines.push(Line::default());
    }

    if let Some(pending) = session.display_pending() {
        let state = if app.send_in_flight() { "sending" } else { "sent" };
        lines.push(Line::from(vec![
            Span::styled("You:", agent_style(Agent::User)),
            Span::styled(format!(" {}", state), Style::default().fg(Color::DarkGray)),
        ]));
        for line in pending.lines() {
            lines.push(Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
            )));
        }
        lines.push(Line::default());
    }

    if session.is_waiting() {
        let advisor = advisor_for(session.process());
        lines.push(Line::from(Span::styled(
            format!("{}:", advisor.display_name()),
            agent_style(advisor),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    } else if session.messages().is_empty() {
        lines.push(Line::from(Span::styled(
            "No messages yet. Say hello, or press s to let the advisor open.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    lines
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let Some(process) = app.session.as_ref().map(|s| s.process()) else {
        return;
    };

    let (left, artifact_area) = split_main(app, area);
    let [chat_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(left);

    app.chat_area = Some(chat_area);
    app.artifact_area = Some(artifact_area);

    // Chat history
    let lines = chat_lines(app);
    let inner_height = chat_area.height.saturating_sub(2);
    let inner_width = chat_area.width.saturating_sub(2);
    app.chat_max_scroll = wrapped_height(&lines, inner_width).saturating_sub(inner_height);
    if app.follow_chat || app.chat_scroll > app.chat_max_scroll {
        app.chat_scroll = app.chat_max_scroll;
    }

    let title = match app.current_phase() {
        Some(phase) => format!(" {} · {} ", process.display_name(), phase.display_name()),
        None => format!(" {} ", process.display_name()),
    };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::Chat)))
        .title(title);
    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    render_input(app, frame, input_area);
    render_artifact(app, frame, artifact_area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let Some(session) = app.session.as_ref() else {
        return;
    };

    let enabled = session.can_send();
    let editing = app.input_mode == InputMode::Editing && app.focus == FocusPane::Input;
    let color = if !enabled {
        Color::DarkGray
    } else if editing || app.focus == FocusPane::Input {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let title = if session.snapshot().is_locked {
        " Locked "
    } else if session.is_waiting() {
        " Waiting for a response... "
    } else {
        " Message (Enter to send) "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(title);

    // Keep the cursor in view by scrolling horizontally
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor = app.input.cursor;
    let offset = if inner_width > 0 && cursor >= inner_width {
        cursor - inner_width + 1
    } else {
        0
    };
    let visible: String = app.input.text.chars().skip(offset).take(inner_width).collect();

    let text_color = if enabled { Color::Cyan } else { Color::DarkGray };
    let input = Paragraph::new(visible)
        .style(Style::default().fg(text_color))
        .block(block);
    frame.render_widget(input, area);

    if editing && app.modal.is_none() {
        frame.set_cursor_position((area.x + (cursor - offset) as u16 + 1, area.y + 1));
    }
}

fn render_artifact(app: &App, frame: &mut Frame, area: Rect) {
    let Some(session) = app.session.as_ref() else {
        return;
    };

    let title = match (session.process(), app.current_phase()) {
        (ChatProcess::ResearchExperiment, Some(phase)) => format!(" {} ", phase.display_name()),
        (ChatProcess::ResearchExperiment, None) => " Research Notes ".to_string(),
        (ChatProcess::PaperWriting, _) => " Draft ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::Artifact)))
        .title(title);

    let artifact = &session.snapshot().artifact;
    if artifact.trim().is_empty() {
        let placeholder = Paragraph::new("Nothing here yet. This fills in as the conversation goes on.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(placeholder, area);
        return;
    }

    let lines: Vec<Line> = artifact.lines().map(artifact_line).collect();
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.artifact_scroll, 0));
    frame.render_widget(paragraph, area);
}

fn render_papers_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let (list_area, detail_area) = split_main(app, area);
    app.chat_area = Some(list_area);
    app.artifact_area = Some(detail_area);

    let focused = app.focus == FocusPane::Chat;
    let Some(view) = app.papers.as_mut() else {
        return;
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(focused)))
        .title(format!(" {} ({}) ", view.kind.display_name(), view.papers.len()));

    if view.papers.is_empty() {
        let text = if !view.loaded {
            "Loading papers..."
        } else if view.kind == ProcessKind::LiteratureSearch {
            "No papers found by search yet. Press / to search or a to auto-search."
        } else {
            "No papers uploaded yet. Add them from the web app."
        };
        let placeholder = Paragraph::new(text)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, list_area);
    } else {
        let items: Vec<ListItem> = view
            .papers
            .iter()
            .map(|paper| {
                let title = if paper.title.is_empty() { paper.id.clone() } else { paper.title.clone() };
                ListItem::new(vec![
                    Line::from(Span::styled(title, Style::default().fg(Color::Yellow).bold())),
                    Line::from(Span::styled(paper.byline(), Style::default().fg(Color::Gray))),
                ])
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(Color::Blue).fg(Color::White))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, list_area, &mut view.state);
    }

    let detail_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Details ");

    let selected = view.state.selected().and_then(|i| view.papers.get(i));
    let detail = match selected {
        Some(paper) => {
            let mut lines = vec![
                Line::from(Span::styled(paper.title.clone(), Style::default().bold())),
                Line::from(Span::styled(paper.byline(), Style::default().fg(Color::Gray))),
            ];
            let mut meta = Vec::new();
            if !paper.source.is_empty() {
                meta.push(paper.source.clone());
            }
            if !paper.status.is_empty() {
                meta.push(paper.status.clone());
            }
            if !meta.is_empty() {
                lines.push(Line::from(Span::styled(meta.join(" · "), Style::default().fg(Color::DarkGray))));
            }
            lines.push(Line::default());
            if paper.r#abstract.is_empty() {
                lines.push(Line::from(Span::styled("No abstract.", Style::default().fg(Color::DarkGray))));
            } else {
                lines.extend(paper.r#abstract.lines().map(|l| Line::from(l.to_string())));
            }
            Paragraph::new(lines)
        }
        None => Paragraph::new("").style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(detail.block(detail_block).wrap(Wrap { trim: false }), detail_area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match (app.screen, app.input_mode) {
        (_, InputMode::Editing) => " INSERT ",
        (Screen::Chat, _) => " CHAT ",
        (Screen::Literature, _) => " PAPERS ",
        (Screen::Welcome, _) => " PROJECTS ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [Span::styled(key, key_style), Span::styled(label, label_style)]
    };

    let mut hints: Vec<Span> = Vec::new();
    if app.modal.is_some() {
        hints.extend(hint(" Enter ", " confirm "));
        hints.extend(hint(" Esc ", " cancel "));
    } else if app.input_mode == InputMode::Editing {
        hints.extend(hint(" Enter ", " send "));
        hints.extend(hint(" Esc ", " stop typing "));
        hints.extend(hint(" Tab ", " focus "));
    } else {
        match app.focus {
            FocusPane::Sidebar => {
                hints.extend(hint(" j/k ", " nav "));
                hints.extend(hint(" Enter ", " open "));
                hints.extend(hint(" n ", " new "));
                hints.extend(hint(" r ", " rename "));
                hints.extend(hint(" D ", " delete "));
            }
            _ if app.screen == Screen::Chat => {
                hints.extend(hint(" i ", " type "));
                hints.extend(hint(" j/k ", " scroll "));
                if app.session.as_ref().map(|s| s.process()) == Some(ChatProcess::ResearchExperiment) {
                    hints.extend(hint(" p ", " phase "));
                    hints.extend(hint(" c ", " complete "));
                }
                hints.extend(hint(" s ", " start "));
                hints.extend(hint(" x ", " reset "));
            }
            _ => {
                hints.extend(hint(" j/k ", " nav "));
                if app.papers.as_ref().is_some_and(|v| v.kind == ProcessKind::LiteratureSearch) {
                    hints.extend(hint(" / ", " search "));
                    hints.extend(hint(" a ", " auto-search "));
                    hints.extend(hint(" o ", " add to organization "));
                }
            }
        }
        hints.extend(hint(" Tab ", " focus "));
        hints.extend(hint(" </> ", " resize "));
        hints.extend(hint(" b ", " sidebar "));
        hints.extend(hint(" m ", " model "));
        hints.extend(hint(" q ", " quit "));
    }

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::styled(" ", label_style)];
    spans.extend(hints);

    if let Some(status) = app.status.as_ref() {
        let color = if status.is_error { Color::Red } else { Color::Green };
        spans.push(Span::styled(format!("  {}", status.text), Style::default().fg(color)));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_topic_input(app: &App, frame: &mut Frame, area: Rect) {
    let (title, prompt, input) = match app.modal.as_ref() {
        Some(Modal::NewProject(input)) => (" New Project ", "Research topic. Enter to save, Esc to cancel.", input),
        Some(Modal::Rename { input, .. }) => (" Rename Project ", "Research topic. Enter to save, Esc to cancel.", input),
        Some(Modal::SearchQuery(input)) => (" Search Papers ", "Keywords. Enter to search, Esc to cancel.", input),
        _ => return,
    };

    let popup_area = centered(area, 60, 7);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title);
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new(prompt)
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let width = input_area.width as usize;
    let offset = if width > 0 && input.cursor >= width { input.cursor - width + 1 } else { 0 };
    let visible: String = input.text.chars().skip(offset).take(width).collect();
    frame.render_widget(Paragraph::new(visible).style(Style::default().fg(Color::Cyan)), input_area);
    frame.set_cursor_position((input_area.x + (input.cursor - offset) as u16, input_area.y));
}

fn render_reset_confirm(app: &App, frame: &mut Frame, area: Rect) {
    let Some(Modal::ConfirmReset { process, options, selected }) = app.modal.as_ref() else {
        return;
    };

    let popup_area = centered(area, 54, 8);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(format!(" Reset {} ", process.display_name()));

    let checkbox = |checked: bool, label: &'static str, row: usize| {
        let mark = if checked { "[x]" } else { "[ ]" };
        let style = if row == *selected {
            Style::default().bg(Color::Blue).fg(Color::White)
        } else {
            Style::default()
        };
        Line::from(Span::styled(format!(" {} {} ", mark, label), style))
    };

    let lines = vec![
        Line::from("Clear the following on the server?"),
        Line::default(),
        checkbox(options.reset_messages, "Conversation messages", 0),
        checkbox(options.reset_artifact, "Artifact", 1),
        Line::default(),
        Line::from(Span::styled(
            "Space toggle, Enter reset, Esc cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(Paragraph::new(lines).block(block), popup_area);
}

fn render_delete_confirm(app: &App, frame: &mut Frame, area: Rect) {
    let Some(Modal::ConfirmDelete { topic, .. }) = app.modal.as_ref() else {
        return;
    };

    let popup_area = centered(area, 60, 6);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Delete Project ");
    let lines = vec![
        Line::from(vec![
            Span::raw("Delete "),
            Span::styled(format!("\"{}\"", topic), Style::default().bold()),
            Span::raw(" and everything in it?"),
        ]),
        Line::default(),
        Line::from(Span::styled("y delete, n cancel", Style::default().fg(Color::DarkGray))),
    ];
    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        popup_area,
    );
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let models = available_models();
    let popup_area = centered(area, 44, models.len() as u16 + 2);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model ");

    let items: Vec<ListItem> = models
        .iter()
        .map(|model| {
            let style = if *model == app.settings.selected_model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}
