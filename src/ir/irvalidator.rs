use super::*;

pub struct IRValidator;

impl IRValidator {
    // Checks that the entry, every block procedure and every invoked
    // procedure exist, and that `provided` supplies each helper used.
    pub fn validate_program(
        program: &Program,
        provided: impl Fn(Helper) -> bool,
    ) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if program.procedure(&program.entry).is_none() {
            errors.push(format!("entry procedure '{}' is not defined", program.entry));
        }
        for (block, procedure) in &program.blocks {
            if program.procedure(procedure).is_none() {
                errors.push(format!(
                    "block '{}' runs undefined procedure '{}'",
                    block, procedure
                ));
            }
        }
        for procedure in &program.procedures {
            Self::validate_body(program, &procedure.name, &procedure.body, &mut errors);
        }
        for helper in program.helpers() {
            if !provided(helper) {
                errors.push(format!("helper '{}' is not provided", helper));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_body(program: &Program, owner: &str, body: &[Instruction], errors: &mut Vec<String>) {
        for inst in body {
            match inst {
                Instruction::Invoke { procedure, .. } if program.procedure(procedure).is_none() => {
                    errors.push(format!("'{}' invokes undefined procedure '{}'", owner, procedure));
                }
                Instruction::Repeat { body, .. } | Instruction::ForEach { body, .. } => {
                    Self::validate_body(program, owner, body, errors);
                }
                _ => {}
            }
        }
    }
}
