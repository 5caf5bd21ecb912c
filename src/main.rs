fn main() -> anyhow::Result<()> {
	pipeline::run(resource_group_deployment::Task)
}
