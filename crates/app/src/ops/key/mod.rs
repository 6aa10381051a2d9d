use clap::{Args, Subcommand};

pub mod generate;
pub mod list;
pub mod passwd;
pub mod show;

use crate::op::Op;

crate::command_enum! {
    (Generate, generate::Generate),
    (Passwd, passwd::Passwd),
    (Show, show::Show),
    (List, list::List),
}

pub type KeyCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Key {
    #[command(subcommand)]
    pub command: KeyCommand,
}

#[async_trait::async_trait]
impl Op for Key {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
