use anyhow::Result;
use std::io::Write;

pub type EmitResult = Result<()>;

/// Keeps the current tab depth while assembly is written out.
#[derive(Debug, Clone, Default)]
pub struct EmitContext {
    indent_level: usize,
}

impl EmitContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        assert!(self.indent_level > 0, "unbalanced dedent");
        self.indent_level -= 1;
    }

    pub fn tabs(&self) -> String {
        "\t".repeat(self.indent_level)
    }
}

pub trait Emitter {
    type Item;

    fn emit<W: Write>(&self, item: &Self::Item, writer: &mut W, context: &mut EmitContext)
        -> EmitResult;

    fn emit_to_string(&self, item: &Self::Item) -> Result<String> {
        let mut buffer = Vec::new();
        let mut context = EmitContext::new();
        self.emit(item, &mut buffer, &mut context)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_depth() {
        let mut ctx = EmitContext::new();
        assert_eq!(ctx.tabs(), "");
        ctx.indent();
        ctx.indent();
        assert_eq!(ctx.tabs(), "\t\t");
        ctx.dedent();
        assert_eq!(ctx.tabs(), "\t");
    }
}
