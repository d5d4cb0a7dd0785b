use std::{
    cell::Cell,
    collections::{BTreeMap, HashMap},
};

use log::debug;

use crate::{
    addr::Addr,
    error::{err, Result},
    expr::{FullIdentifier, LookupContext},
    flags::StatusFlags,
    instruction::ReturnConvention,
    module::{Module, SymbolLookup},
    ranges::RangeMap,
    sink::OutputSink,
};

// -------------------------------------------------------------------------------------------------

/// The multi-module driver: owns every module, resolves `.equ` constants
/// across them in dependency order, polices byte-range ownership, and
/// emits the final image.
#[derive(Default, Debug)]
pub struct Assembler {
    modules:     Vec<Module>,
    named:       HashMap<String, usize>,
    /// Byte ranges per owning module, valid after `assemble()`.
    written:     RangeMap<usize>,
    emit_order:  Vec<usize>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module. Named modules must be unique; anonymous modules
    /// are kept in insertion order.
    pub fn add_module(&mut self, module: Module) -> Result<()> {
        if !module.name().is_empty() {
            if self.named.contains_key(module.name()) {
                return Err(err!(
                    "Multiple files have the same module name \"{}\"",
                    module.name()
                ));
            }
            self.named.insert(module.name().to_string(), self.modules.len());
        }
        self.modules.push(module);
        Ok(())
    }

    /// Parses `text` as a module and registers it.
    pub fn add_source(&mut self, path: &str, text: &str) -> Result<()> {
        self.add_module(Module::from_source(path, text)?)
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module_by_name(&self, name: &str) -> Option<&Module> {
        self.named.get(name).map(|&index| &self.modules[index])
    }

    // ---------------------------------------------------------------------------------------------

    /// Runs the whole pipeline: first pass everywhere, `.equ` resolution in
    /// dependency order, ownership checks, then emission into `sink`.
    pub fn assemble(&mut self, sink: &mut dyn OutputSink) -> Result<()> {
        for module in &mut self.modules {
            module.first_pass()?;
        }

        self.emit_order = self.dependency_order()?;
        self.resolve_equs()?;
        for module in &mut self.modules {
            module.finalize_symbols();
        }

        // Claim every module's ranges before writing a byte, so two
        // modules fighting over an address fail cleanly.
        self.written = RangeMap::new();
        for index in 0..self.modules.len() {
            let chunks = self.modules[index].owned_bytes().chunks().to_vec();
            for (lo, hi) in chunks {
                let conflict = self.written.claim(lo, hi, index).err().copied();
                if let Some(owner) = conflict {
                    return Err(err!(
                        "Modules '{}' and '{}' both write to overlapping ranges at {}",
                        self.module_display_name(owner),
                        self.module_display_name(index),
                        Addr::new(lo)
                    ));
                }
            }
        }

        for &index in &self.emit_order {
            let module = &self.modules[index];
            for (line_index, line) in module.lines().iter().enumerate() {
                let Some(address) = line.address else { continue };
                let context = ModuleContext {
                    assembler:    self,
                    module_index: index,
                    scopes:       module.line_scopes(line_index),
                    deferred:     Cell::new(false),
                };
                line.statement
                    .assemble(address, &context, sink)
                    .map_err(|e| e.with_location(line.statement.location()))?;
            }
        }
        Ok(())
    }

    fn module_display_name(&self, index: usize) -> String {
        let module = &self.modules[index];
        if module.name().is_empty() {
            module.path().to_string()
        } else {
            module.name().to_string()
        }
    }

    /// Orders modules so that every named module comes after the modules
    /// it draws `.equ` values from. A cycle among named modules is fatal.
    fn dependency_order(&self) -> Result<Vec<usize>> {
        let mut placed = vec![false; self.modules.len()];
        let mut order = Vec::with_capacity(self.modules.len());
        loop {
            let mut progressed = false;
            for index in 0..self.modules.len() {
                if placed[index] {
                    continue;
                }
                let ready = self.modules[index].dependencies().iter().all(|dep| {
                    match self.named.get(dep) {
                        Some(&dep_index) => placed[dep_index],
                        // Unknown module names surface as unbound
                        // identifiers during evaluation.
                        None => true,
                    }
                });
                if ready {
                    placed[index] = true;
                    order.push(index);
                    progressed = true;
                }
            }
            if order.len() == self.modules.len() {
                return Ok(order);
            }
            if !progressed {
                let stuck = placed.iter().position(|&p| !p).unwrap();
                return Err(err!(
                    "Cyclic dependency between modules involving '{}'",
                    self.module_display_name(stuck)
                ));
            }
        }
    }

    /// Evaluates every `.equ` definition. Modules are visited in
    /// dependency order; definitions that reach across anonymous modules
    /// are invisible to that ordering, so evaluation runs in fixpoint
    /// rounds, deferring lines whose inputs aren't computed yet. A round
    /// with no progress means the remaining definitions form a cycle.
    fn resolve_equs(&mut self) -> Result<()> {
        loop {
            let mut computed: Vec<(usize, usize, i32)> = Vec::new();
            let mut deferred_count = 0usize;
            let mut first_deferred: Option<(usize, usize)> = None;

            for &index in &self.emit_order {
                let module = &self.modules[index];
                for line_index in module.unresolved_equs() {
                    let context = ModuleContext {
                        assembler:    self,
                        module_index: index,
                        scopes:       module.line_scopes(line_index),
                        deferred:     Cell::new(false),
                    };
                    let expression = module.equ_expression(line_index)?;
                    match expression.evaluate(&context) {
                        Ok(value) => computed.push((index, line_index, value)),
                        Err(_) if context.deferred.get() => {
                            deferred_count += 1;
                            first_deferred.get_or_insert((index, line_index));
                        }
                        Err(e) => {
                            return Err(
                                e.with_location(module.line_location(line_index))
                            )
                        }
                    }
                }
            }

            let progressed = !computed.is_empty();
            for (module_index, line_index, value) in computed {
                self.modules[module_index].set_equ_value(line_index, value);
            }
            if deferred_count == 0 {
                debug!("all .equ definitions resolved");
                return Ok(());
            }
            if !progressed {
                let (module_index, line_index) = first_deferred.unwrap();
                let module = &self.modules[module_index];
                return Err(err!("Cyclic dependency among .equ definitions")
                    .with_location(module.line_location(line_index)));
            }
        }
    }

    // ---------------------------------------------------------------------------------------------

    /// True if some module emitted the byte at `address`.
    pub fn contains(&self, address: Addr) -> bool {
        self.written.contains(address)
    }

    /// The qualified label naming `address`, if any module defined one.
    pub fn name_for_address(&self, address: Addr) -> Option<String> {
        for module in &self.modules {
            if let Some(name) = module.global_for_value(address.raw() as i32) {
                return Some(if module.name().is_empty() {
                    name.to_string()
                } else {
                    format!("{}::{name}", module.name())
                });
            }
        }
        None
    }

    /// Every statically known far-branch destination, with the merged flag
    /// state observed at the branches reaching it. Includes `.entry` and
    /// `.remote` declarations.
    pub fn jump_targets(&self) -> BTreeMap<Addr, StatusFlags> {
        let mut targets: BTreeMap<Addr, StatusFlags> = BTreeMap::new();
        let mut add = |address: Addr, flags: StatusFlags| {
            targets
                .entry(address)
                .and_modify(|existing| *existing = existing.merge(&flags))
                .or_insert(flags);
        };
        for (index, module) in self.modules.iter().enumerate() {
            for (address, flags, _) in self.module_jump_targets(index) {
                add(address, flags);
            }
            for (&address, (flags, _)) in module.declared_targets() {
                add(address, *flags);
            }
        }
        targets
    }

    /// Per-target return conventions gathered from call sites and
    /// declarations. Conflicting conventions for one target are an error.
    pub fn jump_target_return_conventions(&self) -> Result<BTreeMap<Addr, ReturnConvention>> {
        let mut conventions: BTreeMap<Addr, ReturnConvention> = BTreeMap::new();
        let mut add = |address: Addr, convention: ReturnConvention| -> Result<()> {
            match conventions.entry(address) {
                std::collections::btree_map::Entry::Vacant(entry) => {
                    entry.insert(convention);
                }
                std::collections::btree_map::Entry::Occupied(mut entry) => {
                    let merged = entry.get().merge(&convention).map_err(|e| {
                        err!("{} for jump target {address}", e.message())
                    })?;
                    entry.insert(merged);
                }
            }
            Ok(())
        };
        for (index, module) in self.modules.iter().enumerate() {
            for (address, _, convention) in self.module_jump_targets(index) {
                add(address, convention)?;
            }
            for (&address, (_, convention)) in module.declared_targets() {
                add(address, convention.clone())?;
            }
        }
        Ok(conventions)
    }

    /// Far-branch targets of one module, with call-site operands resolved
    /// against the full cross-module context.
    fn module_jump_targets(&self, index: usize) -> Vec<(Addr, StatusFlags, ReturnConvention)> {
        let module = &self.modules[index];
        let mut targets = Vec::new();
        for (line_index, line) in module.lines().iter().enumerate() {
            let (Some(address), Some(instruction)) =
                (line.address, line.statement.instruction())
            else {
                continue;
            };
            let context = ModuleContext {
                assembler:    self,
                module_index: index,
                scopes:       module.line_scopes(line_index),
                deferred:     Cell::new(false),
            };
            if let Some(target) = instruction.far_branch_target_with(address, &context) {
                targets.push((target, line.incoming, instruction.return_convention.clone()));
            }
        }
        targets
    }
}

// -------------------------------------------------------------------------------------------------

/// The lookup context for expressions inside one module line. Resolution
/// order: the line's enclosing scopes innermost first, then the module's
/// globals, then the cross-module registry.
struct ModuleContext<'a> {
    assembler:    &'a Assembler,
    module_index: usize,
    scopes:       &'a [usize],
    /// Set when a lookup failed only because a `.equ` isn't computed yet;
    /// the fixpoint driver retries such lines in a later round.
    deferred:     Cell<bool>,
}

impl ModuleContext<'_> {
    fn unwrap_lookup(&self, lookup: SymbolLookup, id: &FullIdentifier) -> Result<i32> {
        match lookup {
            SymbolLookup::Value(value) => Ok(value),
            SymbolLookup::Pending => {
                self.deferred.set(true);
                Err(err!("Value of '{id}' has not been computed yet"))
            }
        }
    }

    /// Searches every module's globals, in registration order.
    fn registry_lookup(&self, id: &FullIdentifier) -> Result<i32> {
        for module in &self.assembler.modules {
            if let Some(lookup) = module.lookup_global(id.name()) {
                return self.unwrap_lookup(lookup, id);
            }
        }
        Err(err!("Unbound identifier '{id}'"))
    }
}

impl LookupContext for ModuleContext<'_> {
    fn lookup(&self, id: &FullIdentifier) -> Result<i32> {
        match id.module() {
            None => {
                let module = &self.assembler.modules[self.module_index];
                if let Some(lookup) = module.lookup_local(id.name(), self.scopes) {
                    return self.unwrap_lookup(lookup, id);
                }
                self.registry_lookup(id)
            }
            Some("") => self.registry_lookup(id),
            Some(name) => {
                let module = self
                    .assembler
                    .module_by_name(name)
                    .ok_or_else(|| err!("No module named '{name}'"))?;
                match module.lookup_global(id.name()) {
                    Some(lookup) => self.unwrap_lookup(lookup, id),
                    None => Err(err!("Unbound identifier '{id}'")),
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
