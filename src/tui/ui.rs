//! UI rendering for the debugger.

use super::app::DebuggerApp;
use crate::cpu::registers::REGISTER_COUNT;
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(frame.area());

    // Left side: code, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(9),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: float bank, memory and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_floats(frame, right_chunks[0], app);
    draw_memory(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw disassembly around PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:06X}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

/// Draw the byte registers, PC and flags.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cpu = &app.computer.cpu;

    // Four rows of register cells, seven per row
    let mut content: Vec<Line> = (0..REGISTER_COUNT)
        .collect::<Vec<_>>()
        .chunks(7)
        .map(|row| {
            let spans: Vec<Span> = row
                .iter()
                .flat_map(|&i| {
                    let value = cpu.regs.read_byte(i);
                    let style = if value == 0 {
                        Style::default().fg(Color::DarkGray)
                    } else {
                        Style::default().fg(Color::White)
                    };
                    [
                        Span::raw(format!("{}:", (b'A' + i as u8) as char)),
                        Span::styled(format!("{:02X}  ", value), style),
                    ]
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    content.push(Line::from(vec![
        Span::raw("PC: "),
        Span::styled(format!("{:06X}", cpu.pc), Style::default().fg(Color::Yellow)),
        Span::raw("   Flags: "),
        Span::styled(cpu.flags.to_string(), Style::default().fg(Color::Cyan)),
    ]));
    content.push(Line::from(vec![
        Span::raw("Cycles: "),
        Span::styled(format!("{}", cpu.cycles), Style::default().fg(Color::Cyan)),
        Span::raw("   State: "),
        Span::styled(
            format!("{:?}", cpu.state),
            if cpu.is_running() {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Red)
            },
        ),
    ]));

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw the float register bank.
fn draw_floats(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let values = app.computer.cpu.fregs.values();
    let content: Vec<Line> = values
        .chunks(4)
        .enumerate()
        .map(|(row, chunk)| {
            let text: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(i, v)| format!("F{:<2}{:>11.4}", row * 4 + i, v))
                .collect();
            Line::from(text.join(" "))
        })
        .collect();

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Float Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw memory as 16-byte hex rows.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let memc = &app.computer.memc;
    let pc = app.computer.cpu.pc;
    let start = (app.mem_scroll * 16).min(memc.len().saturating_sub(16)) as u32;

    let items: Vec<ListItem> = memc
        .dump(start, visible_rows)
        .into_iter()
        .map(|(addr, row)| {
            let hex: Vec<String> = row.iter().map(|b| format!("{:02X}", b)).collect();
            let text = format!("{:06X}: {}", addr, hex.join(" "));

            let has_pc = (addr..addr + row.len() as u32).contains(&pc);
            let style = if has_pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if row.iter().any(|&b| b != 0) {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    frame.render_widget(list, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Status ").borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint  x: Reset"),
        Line::from("↑↓ PgUp PgDn: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().title(" Help ").borders(Borders::ALL));

    frame.render_widget(help, area);
}
