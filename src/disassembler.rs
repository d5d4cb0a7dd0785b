use std::collections::BTreeMap;

use log::{debug, trace};

use crate::{
    addr::Addr,
    error::{err, Location, Result},
    expr::NullLookupContext,
    flags::StatusFlags,
    instruction::{Instruction, ReturnConvention},
    opcodes::Mnemonic,
    rom::Rom,
};

// -------------------------------------------------------------------------------------------------

/// One decoded instruction in a disassembly listing.
#[derive(Clone, Debug)]
pub struct DisassembledInstruction {
    /// The generated label attached to this address, if it is a branch
    /// target.
    pub label:         Option<String>,
    pub instruction:   Instruction,
    /// True for the caller-provided seed addresses.
    pub is_entry:      bool,
    /// Flag state on entry to this instruction, merged over every path
    /// that reaches it.
    pub current_flags: StatusFlags,
    /// Flag state after this instruction.
    pub next_flags:    StatusFlags,
}

/// Address-ordered decoded instructions.
pub type Disassembly = BTreeMap<Addr, DisassembledInstruction>;

// -------------------------------------------------------------------------------------------------

/// True if executing this instruction means control does not continue to
/// the next address.
fn is_exit_instruction(instruction: &Instruction) -> bool {
    use Mnemonic::*;
    matches!(instruction.mnemonic, JMP | RTL | RTS | RTI | STP | BRA | BRL)
}

/// The work-list disassembler: follows statically evident control flow
/// from the seed addresses, propagating flag state along every path.
pub struct Disassembler<'a> {
    rom:                Rom,
    /// Caller-supplied knowledge about subroutines reached by `jsr`/`jsl`.
    return_conventions: &'a BTreeMap<Addr, ReturnConvention>,
}

impl<'a> Disassembler<'a> {
    pub fn new(rom: Rom, return_conventions: &'a BTreeMap<Addr, ReturnConvention>) -> Self {
        Self { rom, return_conventions }
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    /// Disassembles from one seed address and flag state.
    pub fn disassemble(&self, address: Addr, flags: StatusFlags) -> Result<Disassembly> {
        self.disassemble_all(&[(address, flags)])
    }

    /// Disassembles from a set of seeds. The work-list is keyed by address
    /// and always services the lowest pending address, which keeps the
    /// decoded map growing append-only along each path.
    pub fn disassemble_all(&self, seeds: &[(Addr, StatusFlags)]) -> Result<Disassembly> {
        let mut result = Disassembly::new();

        let mut gensym_count = 0usize;
        let mut label_names: BTreeMap<Addr, String> = BTreeMap::new();
        let mut get_label = |address: Addr| -> String {
            label_names
                .entry(address)
                .or_insert_with(|| {
                    gensym_count += 1;
                    format!("gensym{gensym_count}")
                })
                .clone()
        };

        // Pending (address, incoming flags) pairs.
        let mut work_list: BTreeMap<Addr, StatusFlags> = BTreeMap::new();
        for (address, flags) in seeds {
            work_list
                .entry(*address)
                .and_modify(|existing| *existing = existing.merge(flags))
                .or_insert(*flags);
        }

        // Always service the lowest pending address.
        while let Some((address, incoming)) = work_list.pop_first() {
            if let Some(existing) = result.get(&address) {
                let merged = existing.current_flags.merge(&incoming);
                if merged == existing.current_flags {
                    // Nothing new on this path.
                    continue;
                }
                // The merge weakened what we know; re-decode so the
                // downstream flag states get re-evaluated too.
                trace!("re-deciding {address} with merged flags {merged}");
                self.decode_one(address, merged, &mut get_label, &mut work_list, &mut result)?;
                continue;
            }

            self.decode_one(address, incoming, &mut get_label, &mut work_list, &mut result)?;
        }

        // Attach generated labels to their instructions, in address order.
        for (address, label) in label_names {
            if let Some(entry) = result.get_mut(&address) {
                entry.label = Some(label);
            }
        }
        for (address, _) in seeds {
            if let Some(entry) = result.get_mut(address) {
                entry.is_entry = true;
            }
        }
        debug!("disassembled {} instructions from {} seeds", result.len(), seeds.len());
        Ok(result)
    }

    fn decode_one(
        &self,
        address: Addr,
        incoming: StatusFlags,
        get_label: &mut impl FnMut(Addr) -> String,
        work_list: &mut BTreeMap<Addr, StatusFlags>,
        result: &mut Disassembly,
    ) -> Result<()> {
        let location = Location::from_address(self.rom.path(), address);

        let bytes = self.rom.read_up_to(address, 4).map_err(|e| e.with_location(&location))?;
        let mut instruction =
            Instruction::decode(&bytes, &incoming).map_err(|e| e.with_location(&location))?;

        let size = instruction.serialized_size();
        let next_pc = address.add_wrapped(size as i32);
        let mut next_flags =
            instruction.execute(&incoming).map_err(|e| e.with_location(&location))?;

        let mut enqueue = |work_list: &mut BTreeMap<Addr, StatusFlags>,
                           target: Addr,
                           flags: StatusFlags| {
            work_list
                .entry(target)
                .and_modify(|existing| *existing = existing.merge(&flags))
                .or_insert(flags);
        };

        // A relative branch names a label and queues its target with the
        // branch-taken flag state.
        if instruction.mode.is_relative() {
            let offset = instruction
                .arg1
                .as_ref()
                .and_then(|a| a.evaluate(&NullLookupContext).ok())
                .ok_or_else(|| {
                    err!("logic error: relative instruction with no offset")
                        .with_location(&location)
                })?;
            let target = next_pc.add_wrapped(offset);
            let taken_flags = instruction
                .execute_branch(&incoming)
                .map_err(|e| e.with_location(&location))?;
            enqueue(work_list, target, taken_flags);
            if let Some(arg) = instruction.arg1.as_mut() {
                arg.apply_label(get_label(target));
            }
        }

        // Calls honor the callee's return convention on the fallthrough.
        let mut returns = true;
        if matches!(instruction.mnemonic, Mnemonic::JSR | Mnemonic::JSL) {
            if let Some(callee) = instruction.far_branch_target(address) {
                match self.return_conventions.get(&callee) {
                    Some(ReturnConvention::Yields(yielded)) => next_flags = *yielded,
                    Some(ReturnConvention::NoReturn) => returns = false,
                    _ => {}
                }
            }
        }

        if returns && !is_exit_instruction(&instruction) {
            enqueue(work_list, next_pc, next_flags);
        }

        result.insert(
            address,
            DisassembledInstruction {
                label: None,
                instruction,
                is_entry: false,
                current_flags: incoming,
                next_flags,
            },
        );
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
