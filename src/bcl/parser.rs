use std::ops::RangeInclusive;

use super::{
    command::*,
    token::{self, Token},
    Diagnostic, DiagnosticKind,
};

/// All the commands & diagnostics found in a document.
#[derive(Debug, Default)]
pub struct Parsed {
    pub commands: Vec<Command>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Parsed {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Parses the whole `text`, recovering at each line.
pub fn parse(text: &str) -> Parsed {
    let mut parsed = Parsed::default();
    for res in Parser::new(text) {
        match res {
            Ok(command) => parsed.commands.push(command),
            Err(diagnostic) => parsed.diagnostics.push(diagnostic),
        }
    }

    log::debug!(
        "Parsed {} commands, {} diagnostics",
        parsed.commands.len(),
        parsed.diagnostics.len(),
    );

    parsed
}

/// Splits `text` into lines, the way they are numbered everywhere in the crate.
///
/// Line `n` of the document is item `n - 1`. A trailing `\r` is removed.
pub fn lines(text: &str) -> impl Iterator<Item = &str> + Clone {
    text.split('\n').map(strip_cr)
}

/// Lazy BCL parser.
///
/// Yields one item per non-blank, non-comment line. Cloning the parser
/// gives an independent cursor at the same position.
#[derive(Clone)]
pub struct Parser<'a> {
    lines: std::iter::Enumerate<std::iter::Map<std::str::Split<'a, char>, fn(&str) -> &str>>,
    context: Context,
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

impl<'a> Parser<'a> {
    pub fn new(text: &'a str) -> Self {
        Parser {
            lines: text.split('\n').map(strip_cr as fn(&str) -> &str).enumerate(),
            context: Context::TopLevel,
        }
    }

    /// The block context at the current position.
    pub fn context(&self) -> Context {
        self.context
    }

    fn parse_line(&mut self, line: usize, text: &str, tokens: &[Token<'_>]) -> Result<Command, Diagnostic> {
        let Some((first, rest)) = tokens.split_first() else {
            return Err(DiagnosticKind::MissingOperand("keyword").at(line));
        };

        let kind = match *first {
            Token::Block(keyword) => {
                let keyword = keyword.to_ascii_lowercase();
                let res = self.parse_block(&keyword, Operands::new(rest));
                res.map(CommandKind::Block)
            }
            Token::Statement(keyword) => {
                let keyword = keyword.to_ascii_lowercase();
                self.parse_statement(&keyword, Operands::new(rest))
                    .map(CommandKind::Statement)
            }
            other => Err(DiagnosticKind::UnexpectedToken(other.describe())),
        }
        .map_err(|kind| kind.at(line))?;

        Ok(Command {
            line,
            text: text.to_string(),
            kind,
        })
    }

    fn parse_block(&mut self, keyword: &str, mut ops: Operands) -> Result<Block, DiagnosticKind> {
        // Enter the block even if its operands are wrong,
        // so that the following statements are checked in the right context.
        let (context, res) = match keyword {
            "rev" => (
                Context::TopLevel,
                ops.word("revision").map(|rev| Block::Rev(rev.to_string())),
            ),
            "preset" => (Context::Preset, Ok(Block::Preset)),
            "global" => (Context::Global, Ok(Block::Global)),
            "general" => (Context::General, Ok(Block::General)),
            "encoder" => (
                Context::Encoder,
                ops.number("encoder index", Block::ENCODERS)
                    .map(|idx| Block::Encoder(idx as u8)),
            ),
            "button" => (
                Context::Button,
                ops.number("button index", Block::BUTTONS)
                    .map(|idx| Block::Button(idx as u8)),
            ),
            "store" => (
                Context::TopLevel,
                ops.number("preset", Block::PRESETS)
                    .map(|idx| Block::Store(idx as u8)),
            ),
            "recall" => (
                Context::TopLevel,
                ops.number("preset", Block::PRESETS)
                    .map(|idx| Block::Recall(idx as u8)),
            ),
            "end" => (Context::TopLevel, Ok(Block::End)),
            _ => return Err(DiagnosticKind::UnknownKeyword(format!("${keyword}"))),
        };

        self.context = context;

        let block = res?;
        ops.finish()?;

        Ok(block)
    }

    fn parse_statement(
        &mut self,
        keyword: &str,
        mut ops: Operands,
    ) -> Result<Statement, DiagnosticKind> {
        let allowed = Statement::allowed_in(keyword)
            .ok_or_else(|| DiagnosticKind::UnknownKeyword(format!(".{keyword}")))?;

        if !allowed.contains(&self.context) {
            return Err(DiagnosticKind::WrongContext {
                keyword: format!(".{keyword}"),
                context: self.context,
            });
        }

        let statement = match keyword {
            "name" => {
                let name = ops.string("preset name")?;
                let len = name.chars().count();
                if len > Statement::NAME_MAX_LEN {
                    return Err(DiagnosticKind::OutOfRange {
                        operand: "preset name length",
                        value: len as u32,
                        min: 0,
                        max: Statement::NAME_MAX_LEN as u32,
                    });
                }
                Statement::Name(name.to_string())
            }
            "snapshot" => Statement::Snapshot(ops.on_off("snapshot")?),
            "request" => Statement::Request(ops.on_off("request")?),
            "egroups" => Statement::EGroups(ops.number("encoder groups", 1..=4)? as u8),
            "fkeys" => Statement::FKeys(ops.on_off("fkeys")?),
            "lock" => Statement::Lock(ops.on_off("lock")?),
            "init" => Statement::Init,
            "easypar" => Statement::EasyPar(self.parse_easypar(&mut ops)?),
            "showvalue" => Statement::ShowValue(ops.on_off("showvalue")?),
            "mode" => {
                let word = ops.word("mode")?;
                Statement::Mode(super::Mode::from_word(word, self.context).ok_or_else(|| {
                    DiagnosticKind::MalformedOperand {
                        operand: "mode",
                        found: word.to_string(),
                    }
                })?)
            }
            "default" => Statement::Default(ops.u14("default value")?),
            "minmax" => {
                let min = ops.u14("min value")?;
                let max = ops.u14("max value")?;
                Statement::MinMax { min, max }
            }
            "resolution" => {
                let mut list = vec![ops.u14("resolution")?];
                while list.len() < 4 && ops.has_more() {
                    list.push(ops.u14("resolution")?);
                }
                Statement::Resolution(list)
            }
            "tx" => {
                let mut items = vec![ops.tx_item()?];
                while ops.has_more() {
                    items.push(ops.tx_item()?);
                }
                Statement::Tx(items)
            }
            "midimode" => {
                let word = ops.word("midi mode")?;
                Statement::MidiMode(super::MidiMode::from_word(word).ok_or_else(|| {
                    DiagnosticKind::MalformedOperand {
                        operand: "midi mode",
                        found: word.to_string(),
                    }
                })?)
            }
            "startup" => match ops.peek() {
                Some(Token::Word(word)) if word.eq_ignore_ascii_case("last") => {
                    ops.skip();
                    Statement::Startup(super::Startup::Last)
                }
                _ => Statement::Startup(super::Startup::Preset(
                    ops.number("startup preset", Block::PRESETS)? as u8,
                )),
            },
            "rxch" => match ops.peek() {
                Some(Token::Word(word)) if word.eq_ignore_ascii_case("off") => {
                    ops.skip();
                    Statement::RxCh(None)
                }
                _ => Statement::RxCh(Some(ops.number("receive channel", 1..=16)? as u8)),
            },
            "deviceid" => Statement::DeviceId(ops.number("device id", 1..=16)? as u8),
            _ => return Err(DiagnosticKind::UnknownKeyword(format!(".{keyword}"))),
        };

        ops.finish()?;

        Ok(statement)
    }

    fn parse_easypar(&self, ops: &mut Operands) -> Result<super::EasyPar, DiagnosticKind> {
        use super::EasyPar::*;

        let kind = ops.word("easypar type")?;
        let par = match kind.to_ascii_uppercase().as_str() {
            "CC" => {
                let channel = ops.number("channel", 1..=16)? as u8;
                let number = ops.number("controller", 0..=127)? as u8;
                let min = ops.u14("min value")?;
                let max = ops.u14("max value")?;
                let mode = ops.par_mode(self.context)?;
                for (operand, value) in [("min value", min), ("max value", max)] {
                    if value > mode.max_value() {
                        return Err(DiagnosticKind::OutOfRange {
                            operand,
                            value: value as u32,
                            min: 0,
                            max: mode.max_value() as u32,
                        });
                    }
                }
                Cc {
                    channel,
                    number,
                    min,
                    max,
                    mode,
                }
            }
            "NRPN" => Nrpn {
                channel: ops.number("channel", 1..=16)? as u8,
                number: ops.u14("NRPN number")?,
                min: ops.u14("min value")?,
                max: ops.u14("max value")?,
                mode: ops.par_mode(self.context)?,
            },
            "PC" => Pc {
                channel: ops.number("channel", 1..=16)? as u8,
                program: ops.number("program", 0..=127)? as u8,
            },
            "NOTE" => {
                let channel = ops.number("channel", 1..=16)? as u8;
                let note = ops.number("note", 0..=127)? as u8;
                let velocity = ops.number("velocity", 0..=127)? as u8;
                let mode = ops.par_mode(self.context)?;
                if !matches!(mode, ParMode::ToggleOn | ParMode::ToggleOff) {
                    return Err(DiagnosticKind::MalformedOperand {
                        operand: "note mode",
                        found: mode.to_string(),
                    });
                }
                Note {
                    channel,
                    note,
                    velocity,
                    mode,
                }
            }
            _ => {
                return Err(DiagnosticKind::MalformedOperand {
                    operand: "easypar type",
                    found: kind.to_string(),
                })
            }
        };

        Ok(par)
    }
}

impl<'a> Iterator for Parser<'a> {
    type Item = Result<Command, Diagnostic>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((idx, text)) = self.lines.next() {
            let line = idx + 1;
            let tokens = match token::tokenize(text) {
                Ok(tokens) => tokens,
                Err(kind) => return Some(Err(kind.at(line))),
            };

            if tokens.is_empty() {
                continue;
            }

            let res = self.parse_line(line, text, &tokens);
            return Some(res);
        }

        None
    }
}

/// Cursor on the operands following a keyword.
struct Operands<'t, 'a> {
    iter: std::iter::Peekable<std::slice::Iter<'t, Token<'a>>>,
}

impl<'t, 'a> Operands<'t, 'a> {
    fn new(tokens: &'t [Token<'a>]) -> Self {
        Self {
            iter: tokens.iter().peekable(),
        }
    }

    fn peek(&mut self) -> Option<Token<'a>> {
        self.iter.peek().map(|token| **token)
    }

    fn skip(&mut self) {
        self.iter.next();
    }

    fn has_more(&mut self) -> bool {
        self.iter.peek().is_some()
    }

    fn next(&mut self, operand: &'static str) -> Result<Token<'a>, DiagnosticKind> {
        self.iter
            .next()
            .copied()
            .ok_or(DiagnosticKind::MissingOperand(operand))
    }

    fn number(
        &mut self,
        operand: &'static str,
        range: RangeInclusive<u32>,
    ) -> Result<u32, DiagnosticKind> {
        match self.next(operand)? {
            Token::Number(value) if range.contains(&value) => Ok(value),
            Token::Number(value) => Err(DiagnosticKind::OutOfRange {
                operand,
                value,
                min: *range.start(),
                max: *range.end(),
            }),
            other => Err(DiagnosticKind::MalformedOperand {
                operand,
                found: other.describe(),
            }),
        }
    }

    fn u14(&mut self, operand: &'static str) -> Result<u16, DiagnosticKind> {
        self.number(operand, 0..=crate::midi::u14::MAX as u32)
            .map(|val| val as u16)
    }

    fn word(&mut self, operand: &'static str) -> Result<&'a str, DiagnosticKind> {
        match self.next(operand)? {
            Token::Word(word) => Ok(word),
            other => Err(DiagnosticKind::MalformedOperand {
                operand,
                found: other.describe(),
            }),
        }
    }

    fn string(&mut self, operand: &'static str) -> Result<&'a str, DiagnosticKind> {
        match self.next(operand)? {
            Token::Str(text) => Ok(text),
            other => Err(DiagnosticKind::MalformedOperand {
                operand,
                found: other.describe(),
            }),
        }
    }

    fn on_off(&mut self, operand: &'static str) -> Result<bool, DiagnosticKind> {
        let word = self.word(operand)?;
        if word.eq_ignore_ascii_case("on") {
            Ok(true)
        } else if word.eq_ignore_ascii_case("off") {
            Ok(false)
        } else {
            Err(DiagnosticKind::MalformedOperand {
                operand,
                found: word.to_string(),
            })
        }
    }

    fn par_mode(&mut self, context: Context) -> Result<ParMode, DiagnosticKind> {
        let word = self.word("mode")?;
        let mode = ParMode::from_word(word)
            .filter(|mode| mode.is_allowed_in(context))
            .ok_or_else(|| DiagnosticKind::MalformedOperand {
                operand: "mode",
                found: word.to_string(),
            })?;

        match mode {
            ParMode::Increment(_) => Ok(ParMode::Increment(
                self.number("increment step", 1..=crate::midi::u14::MAX as u32)? as u16,
            )),
            mode => Ok(mode),
        }
    }

    fn tx_item(&mut self) -> Result<TxItem, DiagnosticKind> {
        match self.next("tx data")? {
            Token::Number(value) if value <= 0xff => Ok(TxItem::Byte(value as u8)),
            Token::Number(value) => Err(DiagnosticKind::OutOfRange {
                operand: "tx byte",
                value,
                min: 0,
                max: 0xff,
            }),
            Token::Word(word) if word.to_ascii_lowercase().starts_with("val") => {
                Ok(TxItem::Value(word.to_string()))
            }
            Token::Word(word) if word.to_ascii_lowercase().starts_with("cks") => {
                Ok(TxItem::Checksum(word.to_string()))
            }
            other => Err(DiagnosticKind::MalformedOperand {
                operand: "tx data",
                found: other.describe(),
            }),
        }
    }

    fn finish(mut self) -> Result<(), DiagnosticKind> {
        match self.iter.next() {
            None => Ok(()),
            Some(extra) => Err(DiagnosticKind::ExtraOperand(extra.describe())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESET: &str = "\
$rev R1
$preset
  .name 'Synth'
  .snapshot off
  .egroups 4
; first encoder
$encoder 1
  .easypar CC 1 7 0 127 absolute
  .showvalue on
  .mode 12dot
$button 33
  .easypar CC 1 64 127 0 toggleon
$end
";

    #[test]
    fn full_preset() {
        let parsed = parse(PRESET);
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
        assert_eq!(parsed.commands.len(), 12);

        let first = &parsed.commands[0];
        assert_eq!(first.line, 1);
        assert_eq!(first.kind, CommandKind::Block(Block::Rev("R1".into())));

        let easypar = &parsed.commands[6];
        assert_eq!(easypar.line, 8);
        assert_eq!(easypar.text, "  .easypar CC 1 7 0 127 absolute");
        assert_eq!(
            easypar.kind,
            CommandKind::Statement(Statement::EasyPar(EasyPar::Cc {
                channel: 1,
                number: 7,
                min: 0,
                max: 127,
                mode: ParMode::Absolute,
            }))
        );

        assert_eq!(parsed.commands.last().unwrap().line, 13);
    }

    #[test]
    fn one_bad_line_does_not_stop_parsing() {
        let text = "$encoder 1\n  .easypar CC 1 7 0 127 absolute\n  .frobnicate 3\n  .showvalue on\n$end";
        let parsed = parse(text);

        assert_eq!(parsed.commands.len(), 4);
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(
            parsed.diagnostics[0],
            DiagnosticKind::UnknownKeyword(".frobnicate".into()).at(3)
        );
        assert_eq!(parsed.commands[2].line, 4);
    }

    #[test]
    fn out_of_range_operands() {
        let parsed = parse("$encoder 57");
        assert_eq!(
            parsed.diagnostics,
            vec![DiagnosticKind::OutOfRange {
                operand: "encoder index",
                value: 57,
                min: 1,
                max: 56
            }
            .at(1)]
        );

        let parsed = parse("$encoder 2\n.easypar CC 17 7 0 127 absolute");
        assert!(matches!(
            parsed.diagnostics[0].kind,
            DiagnosticKind::OutOfRange { operand: "channel", value: 17, .. }
        ));

        // 14 bits values only with absolute/14
        let parsed = parse("$encoder 2\n.easypar CC 1 7 0 1000 absolute");
        assert_eq!(parsed.diagnostics.len(), 1);
        let parsed = parse("$encoder 2\n.easypar CC 1 7 0 1000 absolute/14");
        assert!(parsed.is_clean());
    }

    #[test]
    fn bad_block_still_opens_context() {
        let parsed = parse("$encoder 99\n  .easypar CC 1 7 0 127 absolute");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].line, 1);
        assert_eq!(parsed.commands.len(), 1);
        assert_eq!(parsed.commands[0].line, 2);
    }

    #[test]
    fn wrong_context() {
        let parsed = parse("$preset\n  .easypar CC 1 7 0 127 absolute");
        assert_eq!(
            parsed.diagnostics[0].kind,
            DiagnosticKind::WrongContext {
                keyword: ".easypar".into(),
                context: Context::Preset,
            }
        );

        // toggle modes are for buttons
        let parsed = parse("$encoder 1\n  .easypar CC 1 7 0 127 toggleon");
        assert!(matches!(
            parsed.diagnostics[0].kind,
            DiagnosticKind::MalformedOperand { operand: "mode", .. }
        ));
    }

    #[test]
    fn missing_and_extra_operands() {
        let parsed = parse("$button 1\n.easypar CC 1\n.showvalue on on");
        assert_eq!(
            parsed.diagnostics,
            vec![
                DiagnosticKind::MissingOperand("controller").at(2),
                DiagnosticKind::ExtraOperand("on".into()).at(3),
            ]
        );
    }

    #[test]
    fn global_statements() {
        let parsed = parse("$global\n.midimode U-1\n.startup last\n.rxch off\n.deviceid 1\n$end");
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
        assert_eq!(
            parsed.commands[2].kind,
            CommandKind::Statement(Statement::Startup(Startup::Last))
        );
        assert_eq!(
            parsed.commands[3].kind,
            CommandKind::Statement(Statement::RxCh(None))
        );
    }

    #[test]
    fn name_length_counts_chars() {
        // 24 chars, 27 bytes
        let parsed = parse("$preset\n.name 'Crème brûlée for pianos!'");
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);

        let parsed = parse("$preset\n.name 'Crème brûlée for pianos!!'");
        assert!(matches!(
            parsed.diagnostics[0].kind,
            DiagnosticKind::OutOfRange { value: 25, .. }
        ));
    }

    #[test]
    fn button_increment_and_tx() {
        let parsed = parse("$button 2\n.easypar CC 3 20 0 127 increment 5\n.tx $B2 $14 val cks-1");
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
        assert_eq!(
            parsed.commands[2].kind.to_string(),
            ".tx $B2 $14 val cks-1"
        );
        assert_eq!(
            parsed.commands[1].kind.to_string(),
            ".easypar CC 3 20 0 127 increment 5"
        );
    }

    #[test]
    fn lines_without_keyword() {
        let parsed = parse("knob1 cc=1 channel=1\n\nbutton1 cc=2 channel=1");
        assert!(parsed.commands.is_empty());
        assert_eq!(parsed.diagnostics.len(), 2);
        assert_eq!(parsed.diagnostics[0].line, 1);
        assert_eq!(parsed.diagnostics[1].line, 3);
    }

    #[test]
    fn parser_is_restartable() {
        let mut parser = Parser::new(PRESET);
        parser.next();
        let resumed = parser.clone();

        let rest: Vec<_> = parser.collect();
        let again: Vec<_> = resumed.collect();
        assert_eq!(rest, again);
        assert_eq!(rest.len(), 11);
    }

    #[test]
    fn crlf_lines() {
        let parsed = parse("$preset\r\n  .name 'Lead'\r\n$end\r\n");
        assert!(parsed.is_clean());
        assert_eq!(
            parsed.commands[1].kind,
            CommandKind::Statement(Statement::Name("Lead".into()))
        );
        assert_eq!(parsed.commands[1].text, "  .name 'Lead'");
        assert_eq!(lines("a\r\nb").collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
