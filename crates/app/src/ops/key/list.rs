use clap::Args;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct List;

#[async_trait::async_trait]
impl crate::op::Op for List {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let mut lines = Vec::new();
        for name in state.key_set_names()? {
            match state.load_key_set(&name) {
                Ok(key_set) => lines.push(format!("{name}\t{key_set}\t{}", key_set.user_id())),
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "skipping unreadable key set");
                    lines.push(format!("{name}\t<unreadable: {e}>"));
                }
            }
        }
        if lines.is_empty() {
            return Ok("No key sets".to_string());
        }
        Ok(lines.join("\n"))
    }
}
