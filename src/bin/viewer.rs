use std::io;
use std::path::PathBuf;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};
use token_risk::config::DEFAULT_OUTPUT_DIR;
use token_risk::types::{RiskDistribution, RiskLevel, TokenRiskSummary};
use token_risk::viewer::{distribution_lines, format_score, format_timestamp, truncate, ViewerState};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    let dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("OUTPUT_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    let mut app = ViewerState::open(dir);

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app);

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

fn run_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut ViewerState) -> io::Result<()> {
    loop {
        terminal.draw(|f| render(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('r') | KeyCode::Char('R') => app.rescan(),
                KeyCode::Right | KeyCode::Char('l') => app.next_token(),
                KeyCode::Left | KeyCode::Char('h') => app.prev_token(),
                KeyCode::Down | KeyCode::Char('j') => app.next_run(),
                KeyCode::Up | KeyCode::Char('k') => app.prev_run(),
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &ViewerState) {
    let area = f.area();

    let warnings = warning_lines(app);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),                                // header
            Constraint::Length(4),                                // metrics
            Constraint::Min(0),                                   // body
            Constraint::Length(warnings.len().max(1) as u16 + 2), // warnings
            Constraint::Length(1),                                // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_metrics(f, app, chunks[1]);
    render_body(f, app, chunks[2]);
    render_warnings(f, warnings, chunks[3]);
    render_footer(f, chunks[4]);
}

fn render_header(f: &mut Frame, app: &ViewerState, area: Rect) {
    let tokens = app.tokens();
    let runs = app.runs();

    let mut spans = vec![Span::styled(
        " Token Risk Viewer  ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];
    match &app.selection {
        Some(sel) => {
            let token_pos = tokens.iter().position(|t| *t == sel.token).map_or(0, |i| i + 1);
            let run_pos = runs.iter().position(|r| *r == sel.timestamp).map_or(0, |i| i + 1);
            spans.extend([
                Span::styled(truncate(&sel.token, 44), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
                Span::styled(format!(" ({token_pos}/{})", tokens.len()), Style::default().fg(Color::DarkGray)),
                Span::raw("  │  "),
                Span::styled(format_timestamp(sel.timestamp), Style::default().fg(Color::White)),
                Span::styled(format!(" ({run_pos}/{})", runs.len()), Style::default().fg(Color::DarkGray)),
            ]);
            if let Some(files) = app.files() {
                let mark = |present: bool| if present { "✓" } else { "✗" };
                spans.push(Span::raw("  │  "));
                spans.push(Span::styled(
                    format!("report {}  table {}", mark(files.report.is_some()), mark(files.table.is_some())),
                    Style::default().fg(Color::DarkGray),
                ));
            }
        }
        None => spans.push(Span::styled(
            format!("no artifacts in {}", app.dir().display()),
            Style::default().fg(Color::Yellow),
        )),
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    f.render_widget(paragraph, area);
}

fn risk_color(score: f64) -> Color {
    level_color(RiskLevel::from_score(score))
}

fn level_color(level: RiskLevel) -> Color {
    match level {
        RiskLevel::Critical => Color::Red,
        RiskLevel::High => Color::LightRed,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::Low => Color::Green,
    }
}

fn render_metrics(f: &mut Frame, app: &ViewerState, area: Rect) {
    // an absent report reads as zeros; the warning pane says why
    let s = app.loaded.summary.unwrap_or_default();
    let health_color = risk_color(100.0 - s.global_health_score);

    let headline = Line::from(vec![
        Span::raw(" Health "),
        Span::styled(
            format_score(s.global_health_score),
            Style::default().fg(health_color).add_modifier(Modifier::BOLD),
        ),
        Span::raw("   Global risk "),
        Span::styled(
            format_score(s.global_risk_score),
            Style::default().fg(risk_color(s.global_risk_score)).add_modifier(Modifier::BOLD),
        ),
    ]);
    let breakdown = Line::from(sub_risk_spans(&s));

    let paragraph = Paragraph::new(vec![headline, breakdown]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(" SCORES ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
    );
    f.render_widget(paragraph, area);
}

fn sub_risk_spans(s: &TokenRiskSummary) -> Vec<Span<'static>> {
    [
        ("Concentration", s.concentration_risk),
        ("Bot activity", s.bot_risk),
        ("Wash trading", s.wash_trading_risk),
    ]
    .into_iter()
    .flat_map(|(label, v)| {
        [
            Span::raw(format!(" {label} ")),
            Span::styled(format_score(v), Style::default().fg(risk_color(v))),
            Span::raw("  "),
        ]
    })
    .collect()
}

fn render_body(f: &mut Frame, app: &ViewerState, area: Rect) {
    // Horizontal split: distribution (35%) | wallets (65%)
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    let dist = app.loaded.summary.map(|s| s.distribution).unwrap_or_default();
    render_distribution(f, &dist, halves[0]);
    render_wallets_table(f, app, halves[1]);
}

fn render_distribution(f: &mut Frame, dist: &RiskDistribution, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            format!(" DISTRIBUTION ({} wallets) ", dist.total()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    f.render_widget(block, area);

    // Bars above, exact counts below; a zero bar draws nothing.
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(RiskLevel::ALL.len() as u16)])
        .split(inner);

    let data: Vec<(&str, u64)> = RiskLevel::ALL
        .iter()
        .map(|level| (level.as_str(), dist.count(*level) as u64))
        .collect();
    let chart = BarChart::default()
        .data(data.as_slice())
        .bar_width(8)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::LightRed))
        .value_style(Style::default().fg(Color::Black).bg(Color::LightRed).add_modifier(Modifier::BOLD))
        .label_style(Style::default().fg(Color::White));
    f.render_widget(chart, parts[0]);

    let lines: Vec<Line> = RiskLevel::ALL
        .iter()
        .zip(distribution_lines(dist))
        .map(|(level, text)| Line::from(Span::styled(format!(" {text}"), Style::default().fg(level_color(*level)))))
        .collect();
    f.render_widget(Paragraph::new(lines), parts[1]);
}

fn render_wallets_table(f: &mut Frame, app: &ViewerState, area: Rect) {
    let header_cells = ["#", "Wallet", "Score", "Level", "Bot", "Wash flags"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .top_wallets()
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let flags = if r.wash_trading_flags.is_empty() { "—" } else { r.wash_trading_flags.as_str() };
            Row::new(vec![
                Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&r.wallet, 44)),
                Cell::from(format_score(r.risk_score)).style(Style::default().fg(risk_color(r.risk_score))),
                Cell::from(r.risk_level.clone()),
                Cell::from(r.bot_classification.clone()).style(Style::default().fg(Color::Cyan)),
                Cell::from(flags.to_string()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Min(12),
            Constraint::Length(7),
            Constraint::Length(9),
            Constraint::Length(19),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " TOP WALLETS BY RISK ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(table, area);
}

fn warning_lines(app: &ViewerState) -> Vec<Line<'static>> {
    app.scan_error
        .iter()
        .chain(app.loaded.warnings.iter())
        .map(|w| Line::from(Span::styled(format!(" ⚠ {w}"), Style::default().fg(Color::Yellow))))
        .collect()
}

fn render_warnings(f: &mut Frame, lines: Vec<Line<'static>>, area: Rect) {
    let lines = if lines.is_empty() {
        vec![Line::from(Span::styled(" no warnings", Style::default().fg(Color::DarkGray)))]
    } else {
        lines
    };
    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("rescan  "),
        Span::styled("[←→ / h l] ", Style::default().fg(Color::Yellow)),
        Span::raw("token  "),
        Span::styled("[↑↓ / k j] ", Style::default().fg(Color::Yellow)),
        Span::raw("run"),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
