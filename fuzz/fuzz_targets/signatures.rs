#![no_main]

use libfuzzer_sys::fuzz_target;
use dotinject::prelude::*;

fuzz_target!(|data: &[u8]| {
    let _ = SignatureParser::new(data).parse_method_signature();
    let _ = MethodSignature::parse(data);

    let mut tokens = CallTargetTokens::new(
        MemoryStore::new(),
        AssemblyIdentity::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0)),
    );
    if let Ok(local_sig) = tokens.store_mut().token_from_signature(data) {
        let mut body = InstructionList::new(local_sig);
        let _ = tokens.modify_local_sig_and_initialize(&mut body, &MethodArgument::void());
    }
});
