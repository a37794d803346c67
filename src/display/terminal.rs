// src/display/terminal.rs
//! Terminal dashboard: fix, pipeline counters and the race board

use super::UiCommand;
use crate::{
    error::Result,
    gps::data::{format_coordinate, StatusReport},
    race::{RacePhase, RaceState},
};
use crossterm::{
    cursor::{Hide, MoveTo, MoveToNextLine, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, DisableLineWrap, EnableLineWrap},
};
use std::{
    io::{self, Write},
    time::Duration,
};

pub struct TerminalDisplay;

impl TerminalDisplay {
    pub fn new() -> Self {
        Self
    }

    /// Take over the terminal (raw mode, hidden cursor)
    pub fn enter(&self) -> Result<()> {
        terminal::enable_raw_mode()?;
        execute!(io::stdout(), Hide, DisableLineWrap, Clear(ClearType::All))?;
        Ok(())
    }

    /// Give the terminal back
    pub fn leave(&self) -> Result<()> {
        execute!(io::stdout(), Show, EnableLineWrap, MoveToNextLine(1))?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    /// Non-blocking check for an operator key press
    pub fn poll_command(&self) -> Result<Option<UiCommand>> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if let Some(cmd) = command_for(key) {
                    return Ok(Some(cmd));
                }
            }
        }
        Ok(None)
    }

    /// Draw one frame to stdout
    pub fn draw(&self, report: &StatusReport) -> Result<()> {
        let mut stdout = io::stdout();
        queue!(stdout, MoveTo(0, 0))?;
        self.render_display(&mut stdout, report)?;
        stdout.flush()?;
        Ok(())
    }

    /// Render the whole dashboard
    pub fn render_display(&self, out: &mut impl Write, report: &StatusReport) -> Result<()> {
        header(out, Color::Green, &"=".repeat(60))?;
        line(out, "GPS Drag Timer")?;
        header(out, Color::Green, &"=".repeat(60))?;

        let utc = match report.gps.utc {
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => "No time".to_string(),
        };
        line(out, &format!("Receiver time: {}  ({:.1} Hz)", utc, report.gps.rate_hz))?;
        line(out, "")?;

        self.render_fix_section(out, report)?;
        self.render_pipeline_section(out, report)?;
        self.render_race_section(out, &report.race)?;

        header(out, Color::Green, &"=".repeat(60))?;
        line(out, "[a] arm   [r] reset   [q] quit")?;
        queue!(out, Clear(ClearType::FromCursorDown))?;
        Ok(())
    }

    fn render_fix_section(&self, out: &mut impl Write, report: &StatusReport) -> Result<()> {
        let fix = &report.fix;
        let color = if fix.valid { Color::Yellow } else { Color::Red };
        header(out, color, if fix.valid { "FIX:" } else { "FIX: (rejected)" })?;
        line(out, &format!("  Latitude:  {}", format_coordinate(fix.lat, fix.fix_quality > 0)))?;
        line(out, &format!("  Longitude: {}", format_coordinate(fix.lon, fix.fix_quality > 0)))?;
        line(out, &format!("  Altitude:  {:>12.1} m", fix.alt_m))?;
        line(out, &format!("  Speed:     {:>12.1} km/h", fix.speed_kph()))?;
        line(out, &format!("  Course:    {:>12.1}°", fix.course_deg))?;
        line(
            out,
            &format!(
                "  Quality:   {} / {} sats / HDOP {:.1} (~{:.1} m)",
                fix.fix_description(),
                fix.satellites,
                fix.hdop,
                report.gps.acc_m
            ),
        )?;
        line(out, "")
    }

    fn render_pipeline_section(&self, out: &mut impl Write, report: &StatusReport) -> Result<()> {
        let s = &report.stats;
        header(out, Color::Magenta, "PIPELINE:")?;
        line(
            out,
            &format!(
                "  lines {}  gga {}  rmc {}  checksum {}  overflow {}",
                s.nmea_lines, s.gga_ok, s.rmc_ok, s.cks_fail, s.frame_overflow
            ),
        )?;
        line(
            out,
            &format!(
                "  rejected: hdop {}  stale {}  jump {}",
                s.reject_hdop, s.reject_stale, s.reject_jump
            ),
        )?;
        line(out, "")
    }

    fn render_race_section(&self, out: &mut impl Write, race: &RaceState) -> Result<()> {
        let (label, color) = match race.phase() {
            RacePhase::Idle => ("IDLE", Color::Blue),
            RacePhase::Armed => ("ARMED", Color::Yellow),
            RacePhase::Running => ("RUNNING", Color::Green),
        };
        header(out, color, &format!("RACE: {}", label))?;
        line(out, &format!("  Distance:  {:>10.1} m", race.cum_dist_m))?;

        for r in &race.results {
            let row = if r.crossed {
                format!(
                    "  {:<8} {:>8.1} m   ET {:>7.3} s   {:>6.1} km/h",
                    r.name,
                    r.at_m,
                    r.et_s(),
                    r.trap_kph
                )
            } else {
                format!("  {:<8} {:>8.1} m   --", r.name, r.at_m)
            };
            line(out, &row)?;
        }
        line(out, "")
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

fn command_for(key: KeyEvent) -> Option<UiCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(UiCommand::Quit),
        KeyCode::Char('a') => Some(UiCommand::Arm),
        KeyCode::Char('r') => Some(UiCommand::Reset),
        KeyCode::Char('q') | KeyCode::Esc => Some(UiCommand::Quit),
        _ => None,
    }
}

// Raw mode needs explicit line moves instead of '\n'
fn line(out: &mut impl Write, text: &str) -> Result<()> {
    queue!(out, Print(text), Clear(ClearType::UntilNewLine), MoveToNextLine(1))?;
    Ok(())
}

fn header(out: &mut impl Write, color: Color, text: &str) -> Result<()> {
    queue!(out, SetForegroundColor(color))?;
    line(out, text)?;
    queue!(out, ResetColor)?;
    Ok(())
}
