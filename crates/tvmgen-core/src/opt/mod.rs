//! IR-rewriting passes. All passes are conservative: when safety cannot
//! be proven they leave the input unchanged, and none may alter the
//! observable stack effect of a function.

pub mod deleter;
pub mod loc_squasher;
pub mod log_circuit;
pub mod peephole;
pub mod simulator;
pub mod stack_opt;

pub use deleter::{DeleterAfterRet, DeleterCallX};
pub use loc_squasher::LocSquasher;
pub use log_circuit::LogCircuitExpander;
pub use peephole::Peephole;
pub use simulator::Simulator;
pub use stack_opt::StackOptimizer;

use crate::function::Contract;
use anyhow::Result;

pub trait Pass {
    fn name(&self) -> &'static str;

    fn run_on_contract(&mut self, contract: &mut Contract) -> Result<()>;
}

struct NamedPass<F: FnMut(&mut Contract)> {
    name: &'static str,
    run: F,
}

impl<F: FnMut(&mut Contract)> Pass for NamedPass<F> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run_on_contract(&mut self, contract: &mut Contract) -> Result<()> {
        (self.run)(contract);
        Ok(())
    }
}

/// The fixed post-lowering pipeline. Lowering itself runs DeleterAfterRet
/// and LocSquasher once before handing the contract over.
pub fn optimize_contract(contract: &mut Contract) -> Result<()> {
    let mut passes: Vec<Box<dyn Pass>> = vec![
        Box::new(NamedPass { name: "deleter-callx", run: DeleterCallX::run }),
        Box::new(NamedPass { name: "log-circuit-expander", run: LogCircuitExpander::run }),
        Box::new(NamedPass { name: "stack-squeezer", run: StackOptimizer::run }),
        Box::new(NamedPass {
            name: "peephole",
            run: |c: &mut Contract| Peephole::new(false).run(c),
        }),
        Box::new(NamedPass {
            name: "peephole-unpack-opaque",
            run: |c: &mut Contract| Peephole::new(true).run(c),
        }),
        Box::new(NamedPass { name: "loc-squasher", run: LocSquasher::run }),
    ];
    for pass in &mut passes {
        pass.run_on_contract(contract)?;
    }
    Ok(())
}
