use ratatui::{prelude::*, widgets::*};
use road_lab_core::{CellView, Lab, Position, agent::Rgb};

use crate::App;

/// Renders the user interface.
pub fn draw(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // Both labs
            Constraint::Length(2), // Status/help
        ])
        .split(frame.area());

    let labs = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(main_layout[0]);

    render_lab(frame, labs[0], &app.uncoordinated, "Uncoordinated");
    render_lab(frame, labs[1], &app.coordinated, "Coordinated");

    let help_text = Paragraph::new(Line::from(vec![
        Span::styled(app.status.as_str(), Style::default().bold()),
        Span::raw("  |  's' start/stop  'r' randomize  'q' quit"),
    ]))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[1]);
}

/// Renders one lab: its field on top and its metrics below.
fn render_lab(frame: &mut Frame, area: Rect, lab: &Lab, title: &str) {
    let field_height = lab.grid().height() as u16 + 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(field_height), Constraint::Min(9)])
        .split(area);

    let field = Paragraph::new(field_lines(lab))
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(field, chunks[0]);

    render_metrics(frame, chunks[1], lab);
}

fn agent_color(color: Rgb) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

/// One terminal column per cell. Later layers win: walls, trails, planned
/// paths, goals, then the agents themselves.
fn field_lines(lab: &Lab) -> Vec<Line<'static>> {
    let grid = lab.grid();
    let width = grid.width();
    let mut cells: Vec<(char, Style)> = grid
        .enumerate()
        .map(|(pos, _)| match lab.cell_view(pos) {
            CellView::Open => (' ', Style::default()),
            CellView::Hidden => ('#', Style::default().fg(Color::DarkGray)),
            CellView::Discovered => ('#', Style::default().fg(Color::Red).bold()),
        })
        .collect();

    let mut paint = |pos: Position, symbol: char, style: Style| {
        if grid.contains(pos) {
            cells[pos.y * width + pos.x] = (symbol, style);
        }
    };

    for agent in lab.agents() {
        let style = Style::default().fg(agent_color(agent.color));
        for &pos in &agent.trail {
            paint(pos, '.', style.dim());
        }
        for &pos in &agent.path {
            paint(pos, '·', style);
        }
    }
    for agent in lab.agents() {
        let style = Style::default().fg(agent_color(agent.color));
        paint(agent.goal, 'X', style);
    }
    for agent in lab.agents() {
        let symbol = char::from_digit((agent.id % 10) as u32, 10).unwrap_or('@');
        let style = Style::default().fg(agent_color(agent.color)).bold();
        paint(agent.position, symbol, style);
    }

    cells
        .chunks(width.max(1))
        .map(|row| {
            row.iter()
                .map(|&(symbol, style)| Span::styled(symbol.to_string(), style))
                .collect::<Line>()
        })
        .collect()
}

/// Renders the run report of one lab.
fn render_metrics(frame: &mut Frame, area: Rect, lab: &Lab) {
    let metrics = lab.metrics();
    let state = if !lab.is_running() {
        "Idle".to_string()
    } else if let Some(tick) = metrics.finished_tick {
        format!("Complete at tick {tick}")
    } else {
        format!("Running, tick {}", lab.ticks())
    };
    let elapsed = metrics
        .duration()
        .or_else(|| metrics.started_at.map(|started| started.elapsed()));

    let mut rows = vec![
        ("State", state),
        (
            "At goal",
            format!("{}/{}", lab.agents_at_goal(), lab.agents().len()),
        ),
        ("Steps", metrics.total_steps.to_string()),
        ("Discoveries", metrics.discoveries.to_string()),
        ("Redundant", metrics.redundant_discoveries.to_string()),
        ("Efficiency", format!("{:.1}%", metrics.efficiency())),
    ];
    if let Some(elapsed) = elapsed {
        rows.push(("Time", format!("{:.1}s", elapsed.as_secs_f64())));
    }

    let items: Vec<ListItem> = rows
        .into_iter()
        .map(|(label, value)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{label:<12}"), Style::default().fg(Color::Gray)),
                Span::raw(value),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Metrics"));
    frame.render_widget(list, area);
}
