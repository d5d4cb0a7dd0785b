use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;

use crate::{
    addr::Addr,
    directive::DirectiveName,
    error::{err, Location, Result},
    exec::ExecutionState,
    expr::Expression,
    flags::StatusFlags,
    instruction::ReturnConvention,
    parse::{parse_line, LineEntry},
    ranges::DataRange,
    statement::Statement,
    token::tokenize,
};

// -------------------------------------------------------------------------------------------------

/// The result of a symbol probe: either a usable value, or proof that the
/// name exists but is not computable yet (an unresolved `.equ`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SymbolLookup {
    Value(i32),
    Pending,
}

/// A line of code inside an `.asm` module.
#[derive(Clone, Debug)]
pub struct Line {
    pub statement:     Statement,
    pub labels:        Vec<String>,
    pub reached:       bool,
    pub incoming:      StatusFlags,
    pub address:       Option<Addr>,
    /// Stack of line indices of the `.begin` directives enclosing this
    /// line, outermost first.
    pub active_scopes: Vec<usize>,
    /// For a `.begin` line: the labels local to its scope.
    pub scoped_locals: HashMap<String, usize>,
    /// For a `.equ` line: the computed constant.
    pub equ_value:     Option<i32>,
}

impl Line {
    fn new(statement: Statement) -> Self {
        Self {
            statement,
            labels: Vec::new(),
            reached: false,
            incoming: StatusFlags::default(),
            address: None,
            active_scopes: Vec::new(),
            scoped_locals: HashMap::new(),
            equ_value: None,
        }
    }

    fn is_equ(&self) -> bool {
        matches!(self.statement.directive(), Some(d) if d.name == DirectiveName::Equ)
    }
}

// -------------------------------------------------------------------------------------------------

/// One translation unit: the parsed lines of a single `.asm` file, plus
/// the label scoping and layout data the passes accumulate.
#[derive(Debug, Default)]
pub struct Module {
    path:             String,
    module_name:      String,
    lines:            Vec<Line>,
    dependencies:     BTreeSet<String>,
    global_to_line:   HashMap<String, usize>,
    exported_globals: BTreeSet<String>,
    owned_bytes:      DataRange,
    value_to_global:  HashMap<i32, String>,
    /// Addresses declared by `.entry` and `.remote`, with their incoming
    /// flag states and return conventions.
    declared_targets: BTreeMap<Addr, (StatusFlags, ReturnConvention)>,
}

impl Module {
    /// Parses module source text. `path` is used for error locations.
    pub fn from_source(path: impl Into<String>, text: &str) -> Result<Module> {
        let path = path.into();
        let mut module = Module { path: path.clone(), ..Module::default() };

        let mut pending_labels: Vec<String> = Vec::new();
        let mut pending_exports: BTreeSet<String> = BTreeSet::new();
        for (line_index, line_text) in text.lines().enumerate() {
            let location = Location::from_line(path.as_str(), line_index + 1);
            let tokens = tokenize(line_text, &location)?;
            for entry in parse_line(&tokens)? {
                match entry {
                    LineEntry::Label(label) => {
                        if label.exported {
                            pending_exports.insert(label.name.clone());
                        }
                        pending_labels.push(label.name);
                    }
                    LineEntry::Statement(statement) => {
                        if let Some(directive) = statement.directive() {
                            match directive.name {
                                DirectiveName::Module => {
                                    let name = directive
                                        .required_argument()?
                                        .simple_identifier()
                                        .ok_or_else(|| {
                                            err!(".module directive requires a simple name")
                                                .with_location(&location)
                                        })?;
                                    module.module_name = name.to_string();
                                }
                                DirectiveName::Equ => {
                                    let refs =
                                        directive.required_argument()?.module_references();
                                    module.dependencies.extend(refs);
                                }
                                _ => {}
                            }
                        }
                        let mut line = Line::new(statement);
                        line.labels = std::mem::take(&mut pending_labels);
                        module.lines.push(line);
                    }
                }
            }
        }
        if let Some(dangling) = pending_labels.first() {
            return Err(err!("Label '{dangling}' is not attached to any statement")
                .with_location(&Location::from_path(path.as_str())));
        }
        module.exported_globals = pending_exports;
        // A module does not depend on itself.
        let own_name = module.module_name.clone();
        module.dependencies.remove(&own_name);
        Ok(module)
    }

    pub fn name(&self) -> &str {
        &self.module_name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Module names this module's `.equ` definitions reference. Only these
    /// need early (pre-emission) evaluation.
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn owned_bytes(&self) -> &DataRange {
        &self.owned_bytes
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Addresses declared as subroutine entries (`.entry`, `.remote`).
    pub fn declared_targets(&self) -> &BTreeMap<Addr, (StatusFlags, ReturnConvention)> {
        &self.declared_targets
    }

    pub fn is_exported(&self, name: &str) -> bool {
        self.exported_globals.contains(name)
    }

    // ---------------------------------------------------------------------------------------------

    /// The first pass: walks lines in order, maintaining the scope stack,
    /// the emission cursor, and the tracked machine state. Decides every
    /// instruction's size, assigns addresses, registers labels, and claims
    /// the module's byte ranges. Evaluates no cross-line expressions.
    pub fn first_pass(&mut self) -> Result<()> {
        debug!("first pass: module '{}' ({})", self.module_name, self.path);

        let mut pc: Option<Addr> = None;
        let mut state = ExecutionState::default();
        let mut reached = false;
        let mut active_scopes: Vec<usize> = Vec::new();

        for index in 0..self.lines.len() {
            let location = self.lines[index].statement.location().clone();
            self.lines[index].active_scopes = active_scopes.clone();
            self.lines[index].incoming = *state.flags();
            self.lines[index].reached = reached;

            // Register this line's labels in the innermost enclosing
            // scope, or at module level.
            let labels = self.lines[index].labels.clone();
            for label in labels {
                let registry = match active_scopes.last() {
                    Some(&scope_line) => &mut self.lines[scope_line].scoped_locals,
                    None => &mut self.global_to_line,
                };
                if registry.insert(label.clone(), index).is_some() {
                    return Err(err!("Duplicate label definition for '{label}'")
                        .with_location(&location));
                }
            }

            enum Action {
                None,
                SetPc(Addr),
                SetState(ExecutionState),
                DeclareTarget(Addr, StatusFlags, ReturnConvention),
                Halt,
            }
            let mut action = Action::None;
            let mut size = 0u32;
            let mut needs_address = false;

            match &self.lines[index].statement {
                Statement::Directive(directive) => match directive.name {
                    DirectiveName::Begin => {
                        active_scopes.push(index);
                    }
                    DirectiveName::End => {
                        if active_scopes.pop().is_none() {
                            return Err(
                                err!(".end without a matching .begin").with_location(&location)
                            );
                        }
                    }
                    DirectiveName::Org => {
                        let target = directive
                            .required_argument()?
                            .evaluate(&crate::expr::NullLookupContext)
                            .map_err(|e| e.with_location(&location))?;
                        if !(0..=0xFF_FFFF).contains(&target) {
                            return Err(err!(
                                ".org address ${target:x} is outside the address space"
                            )
                            .with_location(&location));
                        }
                        action = Action::SetPc(Addr::new(target as u32));
                    }
                    DirectiveName::Mode => {
                        let flags = directive.flag_argument.unwrap_or_default();
                        let mut new_state = state.clone();
                        new_state.set_flags(flags);
                        action = Action::SetState(new_state);
                    }
                    DirectiveName::Entry => {
                        let address = pc.ok_or_else(|| {
                            err!("No address given for assembly").with_location(&location)
                        })?;
                        let flags = directive.flag_argument.unwrap_or_default();
                        action = Action::DeclareTarget(
                            address,
                            flags,
                            directive.return_convention.clone(),
                        );
                    }
                    DirectiveName::Remote => {
                        let target = directive
                            .required_argument()?
                            .evaluate(&crate::expr::NullLookupContext)
                            .map_err(|e| e.with_location(&location))?;
                        let flags = directive.flag_argument.unwrap_or_default();
                        action = Action::DeclareTarget(
                            Addr::new(target as u32 & 0xFF_FFFF),
                            flags,
                            directive.return_convention.clone(),
                        );
                    }
                    DirectiveName::Halt => {
                        action = Action::Halt;
                    }
                    DirectiveName::Equ | DirectiveName::Module => {}
                    DirectiveName::Db | DirectiveName::Dw | DirectiveName::Dl => {
                        size = directive.serialized_size();
                        needs_address = true;
                    }
                },
                Statement::Instruction(_) => {
                    needs_address = true;
                }
            }

            if let Some(instruction) = self.lines[index].statement.instruction_mut() {
                // Resolve the encoded width against the flag state in
                // force, then size.
                instruction
                    .resolve_width(state.flags())
                    .map_err(|e| e.with_location(&location))?;
                size = instruction.serialized_size();
            }

            match action {
                Action::SetPc(address) => {
                    pc = Some(address);
                    reached = true;
                }
                Action::SetState(new_state) => {
                    state = new_state;
                    reached = true;
                }
                Action::DeclareTarget(address, flags, convention) => {
                    state = ExecutionState::with_flags(flags);
                    reached = true;
                    self.lines[index].incoming = *state.flags();
                    self.lines[index].reached = true;
                    self.declared_targets.insert(address, (*state.flags(), convention));
                }
                Action::Halt => {
                    state = ExecutionState::default();
                    reached = false;
                }
                Action::None => {}
            }

            if needs_address {
                let address = pc.ok_or_else(|| {
                    err!("No address given for assembly").with_location(&location)
                })?;
                self.lines[index].address = Some(address);
                if size > 0 {
                    // The PC wraps at the end of a bank, but never in the
                    // middle of a statement.
                    if address.bank_addr() as u32 + size > 0x1_0000 {
                        return Err(err!(
                            "Statement at {address} would wrap past the end of its bank"
                        )
                        .with_location(&location));
                    }
                    if !self.owned_bytes.claim(address, size) {
                        return Err(err!(
                            "Multiple statements write to the bytes at {address}"
                        )
                        .with_location(&location));
                    }
                    pc = Some(address.add_wrapped(size as i32));
                }
                if let Statement::Instruction(instruction) =
                    &self.lines[index].statement
                {
                    let instruction = instruction.clone();
                    state.execute(&instruction).map_err(|e| e.with_location(&location))?;
                    if instruction.is_exit_instruction() {
                        state = ExecutionState::default();
                        reached = false;
                    }
                }
            }
        }

        if let Some(&open_scope) = active_scopes.last() {
            let location = self.lines[open_scope].statement.location().clone();
            return Err(err!(".begin without a matching .end").with_location(&location));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------------------------

    /// Line indices of `.equ` definitions that still need evaluation.
    pub fn unresolved_equs(&self) -> Vec<usize> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.is_equ() && line.equ_value.is_none())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn equ_expression(&self, index: usize) -> Result<&Expression> {
        self.lines[index]
            .statement
            .directive()
            .filter(|d| d.name == DirectiveName::Equ)
            .ok_or_else(|| err!("logic error: line {index} is not a .equ"))?
            .required_argument()
    }

    pub fn line_location(&self, index: usize) -> &Location {
        self.lines[index].statement.location()
    }

    pub fn line_scopes(&self, index: usize) -> &[usize] {
        &self.lines[index].active_scopes
    }

    pub fn set_equ_value(&mut self, index: usize, value: i32) {
        self.lines[index].equ_value = Some(value);
    }

    /// The value a line's labels stand for: the `.equ` constant if this is
    /// a `.equ` line, otherwise the line's address.
    fn line_value(&self, index: usize) -> Option<SymbolLookup> {
        let line = &self.lines[index];
        if line.is_equ() {
            return Some(match line.equ_value {
                Some(value) => SymbolLookup::Value(value),
                None => SymbolLookup::Pending,
            });
        }
        line.address.map(|a| SymbolLookup::Value(a.raw() as i32))
    }

    /// Scope-aware lookup for a name referenced from a given line: the
    /// enclosing scopes are searched innermost first, then the module's
    /// globals.
    pub fn lookup_local(&self, name: &str, scopes: &[usize]) -> Option<SymbolLookup> {
        for &scope_line in scopes.iter().rev() {
            if let Some(&target) = self.lines[scope_line].scoped_locals.get(name) {
                return self.line_value(target);
            }
        }
        self.lookup_global(name)
    }

    /// Lookup of a module-level name, as seen from other modules.
    pub fn lookup_global(&self, name: &str) -> Option<SymbolLookup> {
        let &target = self.global_to_line.get(name)?;
        self.line_value(target)
    }

    /// Records the reverse value-to-name map once every global has a
    /// value. Exported labels win naming conflicts.
    pub fn finalize_symbols(&mut self) {
        for (name, &index) in &self.global_to_line {
            if let Some(SymbolLookup::Value(value)) = self.line_value(index) {
                let preferred = self.exported_globals.contains(name)
                    || !self.value_to_global.contains_key(&value);
                if preferred {
                    self.value_to_global.insert(value, name.clone());
                }
            }
        }
    }

    /// The global label naming `value`, if any.
    pub fn global_for_value(&self, value: i32) -> Option<&str> {
        self.value_to_global.get(&value).map(String::as_str)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn module(text: &str) -> Module {
        let mut m = Module::from_source("test.asm", text).unwrap();
        m.first_pass().unwrap();
        m
    }

    #[test]
    fn first_pass_assigns_addresses_and_sizes() {
        let m = module(
            ".org $008000\n\
             .entry m8x8\n\
             start: lda #$12\n\
             sta $0100\n\
             rts\n",
        );
        let addresses: Vec<Option<Addr>> = m.lines().iter().map(|l| l.address).collect();
        assert_eq!(
            addresses,
            vec![
                None,
                None,
                Some(Addr::new(0x8000)),
                Some(Addr::new(0x8002)),
                Some(Addr::new(0x8005)),
            ]
        );
        assert_eq!(m.lookup_global("start"), Some(SymbolLookup::Value(0x8000)));
        assert!(m.owned_bytes().contains(Addr::new(0x8005)));
        assert!(!m.owned_bytes().contains(Addr::new(0x8006)));
    }

    #[test]
    fn missing_origin_is_reported() {
        let mut m = Module::from_source("test.asm", ".entry m8x8\nrts\n").unwrap();
        let error = m.first_pass().unwrap_err();
        assert!(
            error.message().contains("No address given for assembly"),
            "{error}"
        );
    }

    #[test]
    fn flex_immediates_follow_the_tracked_flags() {
        let m = module(
            ".org $008000\n\
             .entry m8x8\n\
             lda #$12\n\
             rep #$20\n\
             lda #$1234\n\
             rts\n",
        );
        // 2 bytes while m is on, 3 once rep widened the accumulator.
        assert_eq!(m.lines()[2].statement.serialized_size(), 2);
        assert_eq!(m.lines()[4].statement.serialized_size(), 3);
    }

    #[test]
    fn wide_immediate_under_narrow_flags_is_rejected() {
        let mut m = Module::from_source(
            "test.asm",
            ".org $008000\n.entry m8x8\nlda #$1234\n",
        )
        .unwrap();
        let error = m.first_pass().unwrap_err();
        assert!(error.message().contains("`m`"), "{error}");
    }

    #[test]
    fn scoped_labels_shadow_globals() {
        let m = module(
            ".org $008000\n\
             .mode m8x8\n\
             loop: nop\n\
             .begin\n\
             loop: nop\n\
             bra loop\n\
             .end\n\
             rts\n",
        );
        // The global `loop` is the first nop; the scoped one the second.
        assert_eq!(m.lookup_global("loop"), Some(SymbolLookup::Value(0x8000)));
        let scopes = m.line_scopes(5).to_vec();
        assert_eq!(m.lookup_local("loop", &scopes), Some(SymbolLookup::Value(0x8001)));
    }

    #[test]
    fn duplicate_labels_in_one_scope_are_rejected() {
        let mut m = Module::from_source(
            "test.asm",
            ".org $008000\n.mode m8x8\nfoo: nop\nfoo: nop\n",
        )
        .unwrap();
        let error = m.first_pass().unwrap_err();
        assert!(error.message().contains("Duplicate label"), "{error}");

        // The same name in a nested scope is fine.
        module(".org $008000\n.mode m8x8\nfoo: nop\n{\nfoo: nop\n}\n");
    }

    #[test]
    fn unbalanced_scopes_are_rejected() {
        let mut m =
            Module::from_source("test.asm", ".org $008000\n.begin\n").unwrap();
        assert!(m.first_pass().unwrap_err().message().contains(".begin"));
        let mut m = Module::from_source("test.asm", ".end\n").unwrap();
        assert!(m.first_pass().unwrap_err().message().contains(".end"));
    }

    #[test]
    fn statements_cannot_straddle_banks() {
        let mut m = Module::from_source(
            "test.asm",
            ".org $00ffff\n.mode m8x8\nlda #$12\n",
        )
        .unwrap();
        let error = m.first_pass().unwrap_err();
        assert!(error.message().contains("bank"), "{error}");
    }

    #[test]
    fn overlapping_statements_are_rejected() {
        let mut m = Module::from_source(
            "test.asm",
            ".org $008000\n.mode m8x8\nnop\n.org $008000\nnop\n",
        )
        .unwrap();
        let error = m.first_pass().unwrap_err();
        assert!(error.message().contains("write"), "{error}");
    }

    #[test]
    fn equ_lines_take_no_space_and_resolve_later() {
        let mut m = Module::from_source(
            "test.asm",
            "size .equ 3\n.org $008000\n.mode m8x8\nnop\nrts\n",
        )
        .unwrap();
        m.first_pass().unwrap();
        assert_eq!(m.unresolved_equs(), vec![0]);
        assert_eq!(m.lookup_global("size"), Some(SymbolLookup::Pending));
        m.set_equ_value(0, 3);
        assert_eq!(m.lookup_global("size"), Some(SymbolLookup::Value(3)));
        assert!(m.unresolved_equs().is_empty());
    }

    #[test]
    fn entry_declares_a_target() {
        let m = module(".org $008000\n.entry m8x8 yields native\nrts\n");
        let (flags, convention) = &m.declared_targets()[&Addr::new(0x8000)];
        assert_eq!(flags.name(), "m8x8");
        assert!(matches!(convention, ReturnConvention::Yields(_)));
    }

    #[test]
    fn module_name_and_dependencies() {
        let m = Module::from_source(
            "test.asm",
            ".module m2\nv2 .equ m1::v1 + 1\n",
        )
        .unwrap();
        assert_eq!(m.name(), "m2");
        assert_eq!(m.dependencies(), &BTreeSet::from(["m1".to_string()]));
    }

    #[test]
    fn halt_stops_linear_flag_tracking() {
        let mut m = Module::from_source(
            "test.asm",
            ".org $008000\n.mode m8x8\nnop\n.halt\nlda #$12\n",
        )
        .unwrap();
        // After .halt the flag state is unknown, so the flex immediate
        // cannot size.
        let error = m.first_pass().unwrap_err();
        assert!(error.message().contains("unknown"), "{error}");
    }
}
