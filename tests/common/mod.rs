use asm65816::{Addr, Assembler, VecSink};

/// A run of bytes the assembled image must contain.
pub struct ExpectedBytes {
    pub location: u32,
    pub bytes:    Vec<u8>,
}

fn assemble(sources: &[&str]) -> Result<VecSink, asm65816::Error> {
    let mut assembler = Assembler::new();
    for (index, source) in sources.iter().enumerate() {
        assembler.add_source(&format!("fake_file_{index}.asm"), source)?;
    }
    let mut sink = VecSink::new();
    assembler.assemble(&mut sink)?;
    Ok(sink)
}

/// Assembles the given files and checks the output byte-for-byte: every
/// expected byte must be present, and nothing else may have been written.
pub fn expect_assembly(sources: &[&str], expected: &[ExpectedBytes]) {
    let sink = match assemble(sources) {
        Ok(sink) => sink,
        Err(error) => panic!("unexpected assembly failure: {error}"),
    };

    let mut received = sink.bytes().clone();
    for entry in expected {
        let location = Addr::new(entry.location);
        for (i, expected_byte) in entry.bytes.iter().enumerate() {
            let target = location.add_wrapped(i as i32);
            match received.remove(&target) {
                None => panic!("expected {expected_byte:#04x} at {target}, but nothing written"),
                Some(byte) if byte != *expected_byte => {
                    panic!(
                        "expected {expected_byte:#04x} at {target}, \
                         but {byte:#04x} was written instead"
                    )
                }
                Some(_) => {}
            }
        }
    }
    if let Some((address, byte)) = received.iter().next() {
        panic!("unexpected {byte:#04x} written at {address}");
    }
}

/// Assembles the given files, requiring a failure whose message contains
/// `message`.
pub fn expect_assembly_error(sources: &[&str], message: &str) {
    match assemble(sources) {
        Ok(_) => panic!("unexpected successful assembly"),
        Err(error) => assert!(
            error.to_string().contains(message),
            "expected `{message}` in error message, got: {error}"
        ),
    }
}
