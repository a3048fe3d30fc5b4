use std::fs;
use std::io;
use std::path::Path;

use crate::function::Contract;

pub fn save_contract(contract: &Contract, path: impl AsRef<Path>) -> io::Result<()> {
    let json = serde_json::to_string_pretty(contract)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, json)?;
    Ok(())
}

pub fn load_contract(path: impl AsRef<Path>) -> io::Result<Contract> {
    let json = fs::read_to_string(path)?;
    let contract =
        serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(contract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::{BlockKind, CodeBlock};
    use crate::function::{Function, FunctionKind};
    use tempfile::NamedTempFile;

    #[test]
    fn test_save_load_contract() {
        let body = CodeBlock::new(BlockKind::None, vec![crate::inst::make_ret()]);
        let f = Function::new(0, 0, "fallback", FunctionKind::Macro, body);
        let contract = Contract::new(vec![".version sol 0.3.0".to_string()], vec![f]);
        let temp_file = NamedTempFile::new().unwrap();

        save_contract(&contract, temp_file.path()).unwrap();

        let loaded = load_contract(temp_file.path()).unwrap();
        assert_eq!(loaded, contract);
    }
}
