//! Debugger application state and logic.

use crate::asm::disasm::disassemble_instruction;
use crate::{Computer, EmulatorConfig};
use std::collections::HashSet;

/// Instructions executed per UI tick while running.
const STEPS_PER_TICK: usize = 1000;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub computer: Computer,
    /// Original image for reset and disassembly.
    pub image: Vec<u8>,
    /// Address the image is loaded at.
    pub origin: u32,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u32>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// First 16-byte memory row shown.
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded image.
    pub fn new(config: EmulatorConfig, image: Vec<u8>, origin: u32) -> Result<Self, String> {
        let mut computer = Computer::with_config(config).map_err(|e| e.to_string())?;
        computer.load_mem_at(origin, &image).map_err(|e| e.to_string())?;

        Ok(Self {
            computer,
            image,
            origin,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: origin as usize / 16,
        })
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.computer.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.computer.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.computer.cpu.pc;
        match self.computer.step() {
            Ok(instr) => {
                self.status = format!("{:06X}: {}", pc, instr);
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        // Leave the breakpoint we are stopped on
        if self.breakpoints.contains(&self.computer.cpu.pc) {
            self.step();
        }
        self.running = self.computer.cpu.is_running();
        self.status = "Running...".into();
    }

    /// Run one batch of continuous execution.
    pub fn tick(&mut self) {
        for _ in 0..STEPS_PER_TICK {
            if !self.running {
                return;
            }

            if !self.computer.cpu.is_running() {
                self.running = false;
                self.status = format!("Halted after {} cycles", self.computer.cpu.cycles);
                return;
            }

            // Check for breakpoint
            let pc = self.computer.cpu.pc;
            if self.breakpoints.contains(&pc) {
                self.running = false;
                self.status = format!("Breakpoint at {:06X}", pc);
                return;
            }

            self.step();
        }
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.computer.cpu.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at {:06X}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at {:06X}", pc);
        }
    }

    /// Reset the machine and reload the image.
    pub fn reset(&mut self) {
        self.computer.reset();
        self.running = false;
        self.status = match self.computer.load_mem_at(self.origin, &self.image) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => format!("Reload failed: {}", e),
        };
    }

    /// Disassembly window around the current PC.
    ///
    /// Instructions have variable length, so the listing is walked forward
    /// from the image origin (or from PC when it is outside the image).
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u32, String, bool)> {
        let pc = self.computer.cpu.pc;
        let image_end = self.origin + self.image.len() as u32;
        let start = if (self.origin..image_end).contains(&pc) { self.origin } else { pc };

        let mut listing = Vec::new();
        let mut addr = start;
        let mut current = 0;
        while let Ok(bytes) = self.computer.memc.tail(addr) {
            let (text, len) = disassemble_instruction(bytes);
            if addr == pc {
                current = listing.len();
            }
            listing.push((addr, text, addr == pc));
            addr += len as u32;
            if listing.len() >= current + lines && addr > pc {
                break;
            }
        }

        let first = current.saturating_sub(lines / 2);
        listing.into_iter().skip(first).take(lines).collect()
    }
}

/// Run the debugger with an image loaded at `origin`.
pub fn run_debugger(config: EmulatorConfig, image: Vec<u8>, origin: u32) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    let mut app = DebuggerApp::new(config, image, origin)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.mem_scroll = app.mem_scroll.saturating_sub(1),
                        KeyCode::Down => {
                            let rows = app.computer.memc.len() / 16;
                            if app.mem_scroll + 1 < rows {
                                app.mem_scroll += 1;
                            }
                        }
                        KeyCode::PageUp => app.mem_scroll = app.mem_scroll.saturating_sub(16),
                        KeyCode::PageDown => app.mem_scroll += 16,
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble;

    fn app(source: &str) -> DebuggerApp {
        let config = EmulatorConfig {
            memory_size: 0x1000,
            rng_seed: Some(1),
            ..Default::default()
        };
        DebuggerApp::new(config, assemble(source).unwrap(), 0x100).unwrap()
    }

    #[test]
    fn test_step_updates_status() {
        let mut app = app("LD A, 5\nBREAK");
        app.step();
        assert_eq!(app.computer.cpu.regs.get("A").unwrap(), 5);
        assert!(app.status.starts_with("000100: LD A, 0x05"));
    }

    #[test]
    fn test_run_stops_at_breakpoint() {
        let mut app = app("NOP\nNOP\nBREAK");
        app.step();
        app.toggle_breakpoint();
        app.reset();

        app.run();
        app.tick();
        assert!(!app.running);
        assert_eq!(app.computer.cpu.pc, 0x102);
        assert!(app.computer.cpu.is_running());

        // Resuming continues past the breakpoint
        app.run();
        app.tick();
        assert!(app.computer.cpu.is_halted());
    }

    #[test]
    fn test_reset_reports_reload_failure() {
        let mut app = app("LD A, 5\nBREAK");
        app.reset();
        assert_eq!(app.status, "Reset. Ready.");

        // Image no longer fits below the end of memory
        app.origin = 0xFFF;
        app.reset();
        assert!(app.status.starts_with("Reload failed"));
    }

    #[test]
    fn test_disassembly_marks_pc() {
        let mut app = app("NOP\nLD AB, 0x1234\nBREAK");
        app.step();
        let listing = app.get_disassembly(3);
        assert_eq!(listing[0].0, 0x100);
        assert!(listing[1].2);
        assert_eq!(listing[1].1, "LD AB, 0x1234");
        assert_eq!(listing[2].1, "BREAK");
    }
}
