use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use scholarly_core::ResetOptions;

use crate::app::{App, FocusPane, InputMode, Modal, Screen, TextInput, SPLIT_STEP};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.on_tick().await,
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Popups swallow every key while open
    if app.modal.is_some() {
        handle_modal(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

/// Apply a line-editing key to `input`. Returns false for keys it ignores.
fn edit_text(input: &mut TextInput, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        _ => return false,
    }
    true
}

fn handle_modal(app: &mut App, key: KeyEvent) {
    let Some(modal) = app.modal.take() else {
        return;
    };

    app.modal = match modal {
        Modal::NewProject(mut input) => match key.code {
            KeyCode::Esc => None,
            KeyCode::Enter if !input.is_blank() => {
                app.create_project(&input.text);
                None
            }
            _ => {
                edit_text(&mut input, key);
                Some(Modal::NewProject(input))
            }
        },

        Modal::Rename { project_id, mut input } => match key.code {
            KeyCode::Esc => None,
            KeyCode::Enter if !input.is_blank() => {
                app.rename_project(&project_id, &input.text);
                None
            }
            _ => {
                edit_text(&mut input, key);
                Some(Modal::Rename { project_id, input })
            }
        },

        Modal::ConfirmReset { process, mut options, mut selected } => match key.code {
            KeyCode::Esc | KeyCode::Char('n') => None,
            KeyCode::Enter => {
                app.reset_process(process, options);
                None
            }
            KeyCode::Char('j') | KeyCode::Down | KeyCode::Char('k') | KeyCode::Up | KeyCode::Tab => {
                selected = 1 - selected;
                Some(Modal::ConfirmReset { process, options, selected })
            }
            KeyCode::Char(' ') => {
                if selected == 0 {
                    options.reset_messages = !options.reset_messages;
                } else {
                    options.reset_artifact = !options.reset_artifact;
                }
                Some(Modal::ConfirmReset { process, options, selected })
            }
            _ => Some(Modal::ConfirmReset { process, options, selected }),
        },

        Modal::ConfirmDelete { project_id, topic } => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => {
                app.delete_project(&project_id);
                None
            }
            KeyCode::Esc | KeyCode::Char('n') => None,
            _ => Some(Modal::ConfirmDelete { project_id, topic }),
        },

        Modal::SearchQuery(mut input) => match key.code {
            KeyCode::Esc => None,
            KeyCode::Enter if !input.is_blank() => {
                app.search_literature(&input.text);
                None
            }
            _ => {
                edit_text(&mut input, key);
                Some(Modal::SearchQuery(input))
            }
        },

        Modal::ModelPicker => match key.code {
            KeyCode::Esc => None,
            KeyCode::Char('j') | KeyCode::Down => {
                app.model_picker_nav(true);
                Some(Modal::ModelPicker)
            }
            KeyCode::Char('k') | KeyCode::Up => {
                app.model_picker_nav(false);
                Some(Modal::ModelPicker)
            }
            KeyCode::Enter => {
                app.confirm_model_picker();
                None
            }
            _ => Some(Modal::ModelPicker),
        },
    };
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.submit_input(),
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.cycle_focus();
        }
        _ => {
            edit_text(&mut app.input, key);
        }
    }
}

/// Project an action applies to: the sidebar selection when the sidebar has
/// focus, otherwise the one open in the main area.
fn target_project(app: &App) -> Option<(String, String)> {
    let project = if app.focus == FocusPane::Sidebar {
        app.tree.selected_project()
    } else {
        app.active_project()
    };
    project.map(|p| (p.project_id.clone(), p.topic.clone()))
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Keys that work regardless of focus
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Tab => {
            app.cycle_focus();
            if app.focus == FocusPane::Input {
                app.input_mode = InputMode::Editing;
            }
            return;
        }
        KeyCode::Char('b') => {
            app.toggle_sidebar();
            return;
        }
        KeyCode::Char('<') => {
            app.adjust_split(-SPLIT_STEP);
            return;
        }
        KeyCode::Char('>') => {
            app.adjust_split(SPLIT_STEP);
            return;
        }
        KeyCode::Char('m') => {
            app.open_model_picker();
            return;
        }
        KeyCode::Char('n') => {
            app.modal = Some(Modal::NewProject(TextInput::default()));
            return;
        }
        KeyCode::Char('r') => {
            if let Some((project_id, topic)) = target_project(app) {
                app.modal = Some(Modal::Rename {
                    project_id,
                    input: TextInput::with_text(&topic),
                });
            }
            return;
        }
        KeyCode::Char('D') => {
            if let Some((project_id, topic)) = target_project(app) {
                app.modal = Some(Modal::ConfirmDelete { project_id, topic });
            }
            return;
        }
        KeyCode::Char('R') => {
            app.refresh_projects();
            app.set_status("Refreshing projects...");
            return;
        }
        KeyCode::Esc => {
            if app.sidebar_visible() {
                app.focus = FocusPane::Sidebar;
            }
            return;
        }
        _ => {}
    }

    if app.screen == Screen::Chat && app.focus != FocusPane::Sidebar {
        match key.code {
            KeyCode::Char('i') | KeyCode::Enter => {
                app.focus = FocusPane::Input;
                app.input_mode = InputMode::Editing;
                return;
            }
            KeyCode::Char('s') => {
                app.start_process();
                return;
            }
            KeyCode::Char('p') => {
                app.switch_phase();
                return;
            }
            KeyCode::Char('c') => {
                app.complete_phase();
                return;
            }
            KeyCode::Char('x') => {
                if let Some(process) = app.session.as_ref().map(|s| s.process()) {
                    app.modal = Some(Modal::ConfirmReset {
                        process,
                        options: ResetOptions::default(),
                        selected: 0,
                    });
                }
                return;
            }
            _ => {}
        }
    }

    match app.focus {
        FocusPane::Sidebar => handle_sidebar(app, key),
        FocusPane::Chat if app.screen == Screen::Literature => match key.code {
            KeyCode::Char('j') | KeyCode::Down => app.papers_nav(true),
            KeyCode::Char('k') | KeyCode::Up => app.papers_nav(false),
            KeyCode::Char('/') => app.open_search_query(),
            KeyCode::Char('a') => app.auto_search_literature(),
            KeyCode::Char('o') => app.add_selected_to_organization(),
            _ => {}
        },
        FocusPane::Chat => match key.code {
            KeyCode::Char('j') | KeyCode::Down => app.scroll_chat(1),
            KeyCode::Char('k') | KeyCode::Up => app.scroll_chat(-1),
            KeyCode::Char('d') if ctrl => app.scroll_chat(10),
            KeyCode::Char('u') if ctrl => app.scroll_chat(-10),
            KeyCode::Char('g') => app.scroll_chat(-(app.chat_scroll as i32)),
            KeyCode::Char('G') => app.chat_to_bottom(),
            _ => {}
        },
        FocusPane::Artifact => match key.code {
            KeyCode::Char('j') | KeyCode::Down => app.scroll_artifact(1),
            KeyCode::Char('k') | KeyCode::Up => app.scroll_artifact(-1),
            KeyCode::Char('d') if ctrl => app.scroll_artifact(10),
            KeyCode::Char('u') if ctrl => app.scroll_artifact(-10),
            KeyCode::Char('g') => app.artifact_scroll = 0,
            _ => {}
        },
        FocusPane::Input => {}
    }
}

fn handle_sidebar(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.tree_down(),
        KeyCode::Char('k') | KeyCode::Up => app.tree_up(),
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => app.open_selected(),
        KeyCode::Char('h') | KeyCode::Left => app.tree_collapse(),
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.modal.is_some() {
        return;
    }

    let (x, y) = (mouse.column, mouse.row);
    let in_sidebar = app.sidebar_area.is_some_and(|r| point_in_rect(x, y, r));
    let in_chat = app.chat_area.is_some_and(|r| point_in_rect(x, y, r));
    let in_artifact = app.artifact_area.is_some_and(|r| point_in_rect(x, y, r));

    match mouse.kind {
        MouseEventKind::ScrollDown | MouseEventKind::ScrollUp => {
            let down = mouse.kind == MouseEventKind::ScrollDown;
            let step = if down { 3 } else { -3 };
            if in_sidebar {
                if down {
                    app.tree_down();
                } else {
                    app.tree_up();
                }
            } else if in_chat && app.screen == Screen::Literature {
                app.papers_nav(down);
            } else if in_chat {
                app.scroll_chat(step);
            } else if in_artifact {
                app.scroll_artifact(step);
            }
        }
        MouseEventKind::Down(MouseButton::Left) => {
            let focus = if in_sidebar {
                Some(FocusPane::Sidebar)
            } else if in_chat {
                Some(FocusPane::Chat)
            } else if in_artifact {
                Some(FocusPane::Artifact)
            } else {
                None
            };
            if let Some(focus) = focus {
                app.focus = focus;
                app.input_mode = InputMode::Normal;
            }
        }
        _ => {}
    }
}
